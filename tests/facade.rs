//! Loading a machine and parameters from files and posting through the facade

use axispost::machine::FiveAxisDefinition;
use axispost::{
    poster_from_definition, MachineDefinition, Point3, PoleHandling, PostParameters,
    ToolpathPoint, Vector3,
};

#[test]
fn post_from_saved_configuration() {
    let dir = tempfile::tempdir().unwrap();
    let params_path = dir.path().join("post.toml");
    let params = PostParameters {
        pole_handling: PoleHandling::Freeze,
        interpolation_dist_flag: false,
        ..PostParameters::default()
    };
    params.save_to_file(&params_path).unwrap();
    let loaded = PostParameters::load_from_file(&params_path).unwrap();
    assert_eq!(loaded, params);

    let machine_path = dir.path().join("machine.json");
    let saved = MachineDefinition::FiveAxis(FiveAxisDefinition::default());
    std::fs::write(&machine_path, serde_json::to_string_pretty(&saved).unwrap()).unwrap();
    let definition: MachineDefinition =
        serde_json::from_str(&std::fs::read_to_string(&machine_path).unwrap()).unwrap();
    assert_eq!(definition, saved);
    let poster = poster_from_definition(&definition, loaded, 20.0).unwrap();
    let moves = poster
        .post(&[
            ToolpathPoint::new(Point3::origin(), Vector3::z()),
            ToolpathPoint::new(Point3::new(5.0, 0.0, 0.0), Vector3::z()),
        ])
        .unwrap();
    assert_eq!(moves.len(), 2);
    assert!((moves[1].machine_position.z - 20.0).abs() < 1e-9);
}

#[test]
fn version_is_set() {
    assert!(!axispost::VERSION.is_empty());
    assert!(axispost::BUILD_DATE.ends_with("UTC"));
}

#[test]
fn logging_initializes_once() {
    assert!(axispost::init_logging().is_ok());
    assert!(axispost::init_logging().is_err());
}
