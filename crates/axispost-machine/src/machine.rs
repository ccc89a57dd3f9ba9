//! Machine kinematic model
//!
//! A closed set of machine variants, each carrying its own geometry. Every
//! constructor normalizes direction vectors, validates the configuration and
//! caches transform inverses; afterwards a machine is only changed through
//! explicit unit rescaling.

use axispost_core::{ConfigurationError, Matrix3, Matrix4, Point3, Units, Vector3};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::axis::{FiveAxisTopology, MachineType, Mounting, RotaryAxis, TranslationAxes};
use crate::transform::CachedTransform;
use crate::validate::{
    check_not_parallel, check_spindle_not_along, normalize_rotary, normalize_saw,
    normalize_translation, unit_or_err,
};

/// Geometry shared by every machine variant, as supplied by the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameDefinition {
    /// Tool direction with all rotary angles at zero
    pub spindle: Vector3<f64>,
    pub translation: TranslationAxes,
    /// Maps workpiece coordinates into the table frame
    pub workpiece_transform: Option<Matrix4<f64>>,
    /// Tool-holder offset applied to the tool frame
    pub holder_transform: Option<Matrix4<f64>>,
    pub machine_type: MachineType,
    pub units: Units,
}

impl Default for FrameDefinition {
    fn default() -> Self {
        Self {
            spindle: Vector3::z(),
            translation: TranslationAxes::default(),
            workpiece_transform: None,
            holder_transform: None,
            machine_type: MachineType::Milling,
            units: Units::Metric,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ThreeAxisDefinition {
    pub frame: FrameDefinition,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FourAxisDefinition {
    pub frame: FrameDefinition,
    pub axis: RotaryAxis,
}

impl Default for FourAxisDefinition {
    fn default() -> Self {
        Self {
            frame: FrameDefinition::default(),
            axis: RotaryAxis::new(Vector3::new(0.0, -1.0, 0.0), Mounting::Head),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FiveAxisDefinition {
    pub frame: FrameDefinition,
    pub topology: FiveAxisTopology,
    pub axes: [RotaryAxis; 2],
}

impl Default for FiveAxisDefinition {
    fn default() -> Self {
        Self {
            frame: FrameDefinition::default(),
            topology: FiveAxisTopology::HeadTable,
            axes: [
                RotaryAxis::new(Vector3::new(0.0, 0.0, -1.0), Mounting::Table),
                RotaryAxis::new(Vector3::new(0.0, -1.0, 0.0), Mounting::Head),
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FivePlusOneDefinition {
    #[serde(flatten)]
    pub base: FiveAxisDefinition,
    pub contour_axis: RotaryAxis,
    pub saw_direction: Vector3<f64>,
}

impl Default for FivePlusOneDefinition {
    fn default() -> Self {
        Self {
            base: FiveAxisDefinition {
                frame: FrameDefinition {
                    machine_type: MachineType::Contour,
                    ..FrameDefinition::default()
                },
                ..FiveAxisDefinition::default()
            },
            contour_axis: RotaryAxis::new(Vector3::z(), Mounting::Head),
            saw_direction: Vector3::x(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SixAxisContourDefinition {
    pub frame: FrameDefinition,
    pub axes: [RotaryAxis; 3],
    pub saw_direction: Vector3<f64>,
}

impl Default for SixAxisContourDefinition {
    fn default() -> Self {
        Self {
            frame: FrameDefinition {
                machine_type: MachineType::Contour,
                ..FrameDefinition::default()
            },
            axes: [
                RotaryAxis::new(Vector3::new(0.0, 0.0, -1.0), Mounting::Head),
                RotaryAxis::new(Vector3::new(0.0, -1.0, 0.0), Mounting::Table),
                RotaryAxis::new(Vector3::new(-1.0, 0.0, 0.0), Mounting::Table),
            ],
            saw_direction: Vector3::x(),
        }
    }
}

/// Serializable machine description, one variant per machine kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MachineDefinition {
    ThreeAxis(ThreeAxisDefinition),
    FourAxis(FourAxisDefinition),
    FiveAxis(FiveAxisDefinition),
    FivePlusOne(FivePlusOneDefinition),
    SixAxisContour(SixAxisContourDefinition),
}

impl Default for MachineDefinition {
    fn default() -> Self {
        Self::FiveAxis(FiveAxisDefinition::default())
    }
}

/// Validated frame geometry
#[derive(Debug, Clone, PartialEq)]
pub struct MachineFrame {
    spindle: Vector3<f64>,
    translation: TranslationAxes,
    translation_inverse: Matrix3<f64>,
    workpiece: Option<CachedTransform>,
    holder: Option<CachedTransform>,
    machine_type: MachineType,
    units: Units,
}

impl MachineFrame {
    fn new(def: &FrameDefinition) -> Result<Self, ConfigurationError> {
        let spindle = unit_or_err(&def.spindle, "spindle direction")?;
        let (translation, translation_inverse) = normalize_translation(&def.translation)?;
        let workpiece = def
            .workpiece_transform
            .map(|m| CachedTransform::new(m, "workpiece transform"))
            .transpose()?;
        let holder = def
            .holder_transform
            .map(|m| CachedTransform::new(m, "holder transform"))
            .transpose()?;
        Ok(Self {
            spindle,
            translation,
            translation_inverse,
            workpiece,
            holder,
            machine_type: def.machine_type,
            units: def.units,
        })
    }

    /// Spindle direction as defined, before the holder transform
    pub fn spindle(&self) -> &Vector3<f64> {
        &self.spindle
    }

    pub fn translation(&self) -> &TranslationAxes {
        &self.translation
    }

    /// Inverse of the matrix whose columns are the translation directions
    pub fn translation_inverse(&self) -> &Matrix3<f64> {
        &self.translation_inverse
    }

    pub fn workpiece(&self) -> Option<&CachedTransform> {
        self.workpiece.as_ref()
    }

    pub fn holder(&self) -> Option<&CachedTransform> {
        self.holder.as_ref()
    }

    pub fn machine_type(&self) -> MachineType {
        self.machine_type
    }

    pub fn units(&self) -> Units {
        self.units
    }

    /// Spindle direction after the holder transform
    pub fn tool_spindle(&self) -> Vector3<f64> {
        match &self.holder {
            Some(h) => h.apply_vector(&self.spindle).normalize(),
            None => self.spindle,
        }
    }

    /// Tool tip relative to the gauge point with all angles at zero
    pub fn tool_tip(&self, tool_length: f64) -> Point3<f64> {
        let tip = Point3::from(-self.spindle * tool_length);
        match &self.holder {
            Some(h) => h.apply_point(&tip),
            None => tip,
        }
    }

    fn scale(&mut self, factor: f64) {
        for i in 0..3 {
            self.translation.min[i] *= factor;
            self.translation.max[i] *= factor;
        }
        self.workpiece = self.workpiece.as_ref().map(|w| w.scaled(factor));
        self.holder = self.holder.as_ref().map(|h| h.scaled(factor));
    }
}

/// Three translation axes, no rotary axis
#[derive(Debug, Clone, PartialEq)]
pub struct ThreeAxisMachine {
    frame: MachineFrame,
}

/// One rotary axis on the head or the table
#[derive(Debug, Clone, PartialEq)]
pub struct FourAxisMachine {
    frame: MachineFrame,
    axes: [RotaryAxis; 1],
}

/// Two rotary axes in one of the four kinematic topologies
#[derive(Debug, Clone, PartialEq)]
pub struct FiveAxisMachine {
    frame: MachineFrame,
    topology: FiveAxisTopology,
    axes: [RotaryAxis; 2],
}

/// Five-axis kinematics plus a head-mounted contour axis about the spindle
#[derive(Debug, Clone, PartialEq)]
pub struct FivePlusOneMachine {
    frame: MachineFrame,
    topology: FiveAxisTopology,
    /// Axes 0 and 1 follow `topology`; axis 2 is the contour axis
    axes: [RotaryAxis; 3],
    saw_direction: Vector3<f64>,
}

/// Three independently mounted rotary axes and a saw direction
#[derive(Debug, Clone, PartialEq)]
pub struct SixAxisContourMachine {
    frame: MachineFrame,
    axes: [RotaryAxis; 3],
    saw_direction: Vector3<f64>,
}

impl FivePlusOneMachine {
    /// The underlying five-axis machine without the contour axis
    pub fn extract_five_axis(&self) -> FiveAxisMachine {
        FiveAxisMachine {
            frame: self.frame.clone(),
            topology: self.topology,
            axes: [self.axes[0].clone(), self.axes[1].clone()],
        }
    }
}

/// Machine kinematic model
#[derive(Debug, Clone, PartialEq)]
pub enum Machine {
    ThreeAxis(ThreeAxisMachine),
    FourAxis(FourAxisMachine),
    FiveAxis(FiveAxisMachine),
    FivePlusOne(FivePlusOneMachine),
    SixAxisContour(SixAxisContourMachine),
}

impl Machine {
    /// Build and validate a machine from its serializable description
    pub fn from_definition(def: &MachineDefinition) -> Result<Self, ConfigurationError> {
        let machine = match def {
            MachineDefinition::ThreeAxis(d) => Self::three_axis(d.frame.clone()),
            MachineDefinition::FourAxis(d) => Self::four_axis(d.frame.clone(), d.axis.clone()),
            MachineDefinition::FiveAxis(d) => {
                Self::five_axis(d.frame.clone(), d.topology, d.axes.clone())
            }
            MachineDefinition::FivePlusOne(d) => Self::five_plus_one(
                d.base.frame.clone(),
                d.base.topology,
                d.base.axes.clone(),
                d.contour_axis.clone(),
                d.saw_direction,
            ),
            MachineDefinition::SixAxisContour(d) => {
                Self::six_axis_contour(d.frame.clone(), d.axes.clone(), d.saw_direction)
            }
        }?;
        debug!(
            "Built {} machine ({} axes, {})",
            machine.kind_name(),
            machine.number_of_axes(),
            machine.units()
        );
        Ok(machine)
    }

    /// Three-axis machine
    pub fn three_axis(frame: FrameDefinition) -> Result<Self, ConfigurationError> {
        let frame = MachineFrame::new(&frame)?;
        Ok(Self::ThreeAxis(ThreeAxisMachine { frame }))
    }

    /// Four-axis machine with a single rotary axis
    pub fn four_axis(frame: FrameDefinition, axis: RotaryAxis) -> Result<Self, ConfigurationError> {
        let frame = MachineFrame::new(&frame)?;
        let axis = normalize_rotary(&axis, 0)?;
        check_spindle_not_along(&frame.tool_spindle(), &axis.direction, 0)?;
        Ok(Self::FourAxis(FourAxisMachine {
            frame,
            axes: [axis],
        }))
    }

    /// Five-axis machine; axis mountings are taken from `topology`
    pub fn five_axis(
        frame: FrameDefinition,
        topology: FiveAxisTopology,
        axes: [RotaryAxis; 2],
    ) -> Result<Self, ConfigurationError> {
        let frame = MachineFrame::new(&frame)?;
        let axes = normalize_pair(&axes, topology)?;
        let machine = Self::FiveAxis(FiveAxisMachine {
            frame,
            topology,
            axes,
        });
        machine.check_inner_link()?;
        Ok(machine)
    }

    /// Five-axis machine plus a contour axis turning the saw about the spindle
    pub fn five_plus_one(
        frame: FrameDefinition,
        topology: FiveAxisTopology,
        axes: [RotaryAxis; 2],
        contour: RotaryAxis,
        saw_direction: Vector3<f64>,
    ) -> Result<Self, ConfigurationError> {
        let frame = MachineFrame::new(&frame)?;
        let [a0, a1] = normalize_pair(&axes, topology)?;
        let contour = RotaryAxis {
            mounting: Mounting::Head,
            ..normalize_rotary(&contour, 2)?
        };
        let spindle = frame.tool_spindle();
        if !axispost_core::geometry::are_parallel(
            &spindle,
            &contour.direction,
            axispost_core::geometry::PARALLEL_TOL,
        ) {
            return Err(ConfigurationError::ContourAxisNotAlongSpindle);
        }
        let saw_direction = normalize_saw(&saw_direction, frame.spindle())?;
        let machine = Self::FivePlusOne(FivePlusOneMachine {
            frame,
            topology,
            axes: [a0, a1, contour],
            saw_direction,
        });
        machine.check_inner_link()?;
        Ok(machine)
    }

    /// Six-axis contour machine with three rotary axes
    pub fn six_axis_contour(
        frame: FrameDefinition,
        axes: [RotaryAxis; 3],
        saw_direction: Vector3<f64>,
    ) -> Result<Self, ConfigurationError> {
        let frame = MachineFrame::new(&frame)?;
        let axes = [
            normalize_rotary(&axes[0], 0)?,
            normalize_rotary(&axes[1], 1)?,
            normalize_rotary(&axes[2], 2)?,
        ];
        let saw_direction = normalize_saw(&saw_direction, frame.spindle())?;
        let machine = Self::SixAxisContour(SixAxisContourMachine {
            frame,
            axes,
            saw_direction,
        });
        let chain = machine.orientation_chain();
        check_not_parallel(
            &chain[0].direction,
            &chain[1].direction,
            chain[0].axis,
            chain[1].axis,
        )?;
        check_not_parallel(
            &chain[1].direction,
            &chain[2].direction,
            chain[1].axis,
            chain[2].axis,
        )?;
        Ok(machine)
    }

    /// Default head/table five-axis machine
    pub fn default_five_axis() -> Result<Self, ConfigurationError> {
        Self::from_definition(&MachineDefinition::FiveAxis(FiveAxisDefinition::default()))
    }

    /// Default head/table/table six-axis contour machine
    pub fn default_six_axis_contour() -> Result<Self, ConfigurationError> {
        Self::from_definition(&MachineDefinition::SixAxisContour(
            SixAxisContourDefinition::default(),
        ))
    }

    pub fn frame(&self) -> &MachineFrame {
        match self {
            Self::ThreeAxis(m) => &m.frame,
            Self::FourAxis(m) => &m.frame,
            Self::FiveAxis(m) => &m.frame,
            Self::FivePlusOne(m) => &m.frame,
            Self::SixAxisContour(m) => &m.frame,
        }
    }

    fn frame_mut(&mut self) -> &mut MachineFrame {
        match self {
            Self::ThreeAxis(m) => &mut m.frame,
            Self::FourAxis(m) => &mut m.frame,
            Self::FiveAxis(m) => &mut m.frame,
            Self::FivePlusOne(m) => &mut m.frame,
            Self::SixAxisContour(m) => &mut m.frame,
        }
    }

    pub fn rotary_axes(&self) -> &[RotaryAxis] {
        match self {
            Self::ThreeAxis(_) => &[],
            Self::FourAxis(m) => &m.axes,
            Self::FiveAxis(m) => &m.axes,
            Self::FivePlusOne(m) => &m.axes,
            Self::SixAxisContour(m) => &m.axes,
        }
    }

    fn rotary_axes_mut(&mut self) -> &mut [RotaryAxis] {
        match self {
            Self::ThreeAxis(_) => &mut [],
            Self::FourAxis(m) => &mut m.axes,
            Self::FiveAxis(m) => &mut m.axes,
            Self::FivePlusOne(m) => &mut m.axes,
            Self::SixAxisContour(m) => &mut m.axes,
        }
    }

    pub fn rotary_axis_count(&self) -> usize {
        self.rotary_axes().len()
    }

    /// Total number of controlled axes (translations plus rotaries)
    pub fn number_of_axes(&self) -> usize {
        3 + self.rotary_axis_count()
    }

    pub fn topology(&self) -> Option<FiveAxisTopology> {
        match self {
            Self::FiveAxis(m) => Some(m.topology),
            Self::FivePlusOne(m) => Some(m.topology),
            _ => None,
        }
    }

    /// Saw direction at zero angles, before the holder transform
    pub fn saw_direction(&self) -> Option<Vector3<f64>> {
        match self {
            Self::FivePlusOne(m) => Some(m.saw_direction),
            Self::SixAxisContour(m) => Some(m.saw_direction),
            _ => None,
        }
    }

    /// Saw direction after the holder transform
    pub fn tool_saw(&self) -> Option<Vector3<f64>> {
        let saw = self.saw_direction()?;
        Some(match self.frame().holder() {
            Some(h) => h.apply_vector(&saw).normalize(),
            None => saw,
        })
    }

    pub fn machine_type(&self) -> MachineType {
        self.frame().machine_type()
    }

    pub fn units(&self) -> Units {
        self.frame().units()
    }

    /// Short name of the variant for diagnostics
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::ThreeAxis(_) => "3-axis",
            Self::FourAxis(_) => "4-axis",
            Self::FiveAxis(_) => "5-axis",
            Self::FivePlusOne(_) => "5+1-axis",
            Self::SixAxisContour(_) => "6-axis contour",
        }
    }

    /// Rescale every linear quantity by `factor` and switch to `units`
    ///
    /// Base points, translation limits and transform translations scale;
    /// angle limits and directions are untouched.
    pub fn scale(&mut self, units: Units, factor: f64) {
        debug!(
            "Scaling {} machine from {} to {} by {}",
            self.kind_name(),
            self.units(),
            units,
            factor
        );
        self.frame_mut().scale(factor);
        self.frame_mut().units = units;
        for axis in self.rotary_axes_mut() {
            axis.base_point = Point3::from(axis.base_point.coords * factor);
        }
    }

    /// Independent copy rescaled to `units`
    pub fn scaled(&self, units: Units, factor: f64) -> Self {
        let mut copy = self.clone();
        copy.scale(units, factor);
        copy
    }

    /// Move every rotary base point to the origin
    pub fn eliminate_shifts(&mut self) {
        for axis in self.rotary_axes_mut() {
            axis.base_point = Point3::origin();
        }
    }

    /// The innermost orientation link must be able to tilt the spindle
    fn check_inner_link(&self) -> Result<(), ConfigurationError> {
        let chain = self.orientation_chain();
        let tilting: Vec<_> = chain.iter().filter(|l| l.axis < 2).collect();
        if let [outer, inner] = tilting.as_slice() {
            check_not_parallel(&outer.direction, &inner.direction, 0, 1)?;
            check_spindle_not_along(&self.frame().tool_spindle(), &inner.direction, inner.axis)?;
        }
        Ok(())
    }
}

fn normalize_pair(
    axes: &[RotaryAxis; 2],
    topology: FiveAxisTopology,
) -> Result<[RotaryAxis; 2], ConfigurationError> {
    let mountings = topology.mountings();
    let a0 = RotaryAxis {
        mounting: mountings[0],
        ..normalize_rotary(&axes[0], 0)?
    };
    let a1 = RotaryAxis {
        mounting: mountings[1],
        ..normalize_rotary(&axes[1], 1)?
    };
    Ok([a0, a1])
}
