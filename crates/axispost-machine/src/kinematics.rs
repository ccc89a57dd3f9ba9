//! Forward and inverse machine kinematics
//!
//! Orientation kinematics work on the orientation chain: the rotary axes
//! listed outer to inner as seen from the table frame, with table axis
//! directions negated. Point kinematics rotate the tool about head axis base
//! points and the workpiece about table axis base points.
//!
//! All angles taken by this module are radians.

use axispost_core::geometry::rotate_point_about;
use axispost_core::{AngleTuple, LimitAxis, Matrix3, Point3, PostError, Vector3};

use crate::axis::{FiveAxisTopology, Mounting};
use crate::machine::Machine;

/// Tolerance applied to translation limits
pub const TRANSLATION_LIMIT_TOL: f64 = 1e-12;

/// One rotary axis in the orientation chain
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChainLink {
    /// Rotary axis index on the machine
    pub axis: usize,
    /// Direction in the table frame (negated for table axes)
    pub direction: Vector3<f64>,
    pub mounting: Mounting,
}

/// A violated axis limit
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LimitHit {
    pub axis: LimitAxis,
    pub value: f64,
    pub limit: f64,
}

impl LimitHit {
    pub fn into_error(self, index: Option<usize>) -> PostError {
        PostError::LimitViolation {
            index,
            axis: self.axis,
            value: self.value,
            limit: self.limit,
        }
    }
}

impl Machine {
    /// Rotary axes from outer to inner as seen from the table frame
    pub fn orientation_chain(&self) -> Vec<ChainLink> {
        let axes = self.rotary_axes();
        let link = |i: usize| ChainLink {
            axis: i,
            direction: axes[i].effective_direction(),
            mounting: axes[i].mounting,
        };
        let mut tables: Vec<usize> = (0..axes.len())
            .filter(|&i| axes[i].mounting == Mounting::Table)
            .collect();
        if self.topology() != Some(FiveAxisTopology::TableTableLegacy) {
            tables.reverse();
        }
        let heads = (0..axes.len()).filter(|&i| axes[i].mounting == Mounting::Head);
        tables.into_iter().chain(heads).map(link).collect()
    }

    /// Spindle direction after the holder transform
    pub fn tool_spindle(&self) -> Vector3<f64> {
        self.frame().tool_spindle()
    }

    /// Workpiece vector expressed in the table frame
    pub fn to_table_frame(&self, v: &Vector3<f64>) -> Vector3<f64> {
        match self.frame().workpiece() {
            Some(w) => w.apply_vector(v),
            None => *v,
        }
    }

    /// Table-frame vector expressed in workpiece coordinates
    pub fn to_part_frame(&self, v: &Vector3<f64>) -> Vector3<f64> {
        match self.frame().workpiece() {
            Some(w) => w.invert_vector(v),
            None => *v,
        }
    }

    /// Rotate a tool-fixed vector through the chain into the table frame
    pub fn chain_rotate(&self, v: &Vector3<f64>, angles: &AngleTuple) -> Vector3<f64> {
        self.orientation_chain()
            .iter()
            .rev()
            .fold(*v, |acc, l| {
                axispost_core::geometry::rotate(&acc, &l.direction, angle_of(angles, l.axis))
            })
    }

    /// Tool orientation in the table frame for `angles`
    pub fn table_orientation(&self, angles: &AngleTuple) -> Vector3<f64> {
        self.chain_rotate(&self.tool_spindle(), angles)
    }

    /// Tool orientation in workpiece coordinates for `angles`
    pub fn orientation_from_angles(&self, angles: &AngleTuple) -> Vector3<f64> {
        self.to_part_frame(&self.table_orientation(angles))
    }

    /// Saw direction in workpiece coordinates, for machines that have one
    pub fn saw_from_angles(&self, angles: &AngleTuple) -> Option<Vector3<f64>> {
        let saw = self.tool_saw()?;
        Some(self.to_part_frame(&self.chain_rotate(&saw, angles)))
    }

    /// Place a tool-frame point in the machine frame
    fn apply_head(&self, p: &Point3<f64>, angles: &AngleTuple) -> Point3<f64> {
        let axes = self.rotary_axes();
        (0..axes.len())
            .rev()
            .filter(|&i| axes[i].mounting == Mounting::Head)
            .fold(*p, |acc, i| {
                rotate_point_about(
                    &acc,
                    &axes[i].base_point,
                    &axes[i].direction,
                    angle_of(angles, i),
                )
            })
    }

    /// Table axis indices from the innermost physical axis outwards
    fn table_order(&self) -> Vec<usize> {
        let axes = self.rotary_axes();
        let mut order: Vec<usize> = (0..axes.len())
            .filter(|&i| axes[i].mounting == Mounting::Table)
            .collect();
        if self.topology() != Some(FiveAxisTopology::TableTableLegacy) {
            order.reverse();
        }
        order
    }

    /// Place a table-frame point in the machine frame
    fn apply_table(&self, p: &Point3<f64>, angles: &AngleTuple) -> Point3<f64> {
        let axes = self.rotary_axes();
        self.table_order().into_iter().fold(*p, |acc, i| {
            rotate_point_about(
                &acc,
                &axes[i].base_point,
                &axes[i].direction,
                angle_of(angles, i),
            )
        })
    }

    fn invert_table(&self, p: &Point3<f64>, angles: &AngleTuple) -> Point3<f64> {
        let axes = self.rotary_axes();
        self.table_order().into_iter().rev().fold(*p, |acc, i| {
            rotate_point_about(
                &acc,
                &axes[i].base_point,
                &axes[i].direction,
                -angle_of(angles, i),
            )
        })
    }

    /// Machine-frame direction of rotary axis `axis` once the axes carrying
    /// it have turned by `angles`
    pub fn rotary_direction_in_pose(&self, axis: usize, angles: &AngleTuple) -> Vector3<f64> {
        let axes = self.rotary_axes();
        let Some(target) = axes.get(axis) else {
            return Vector3::zeros();
        };
        let carriers: Vec<usize> = match target.mounting {
            Mounting::Head => (0..axis)
                .rev()
                .filter(|&i| axes[i].mounting == Mounting::Head)
                .collect(),
            Mounting::Table => self
                .table_order()
                .into_iter()
                .skip_while(|&i| i != axis)
                .skip(1)
                .collect(),
        };
        carriers.into_iter().fold(target.direction, |acc, i| {
            axispost_core::geometry::rotate(&acc, &axes[i].direction, angle_of(angles, i))
        })
    }

    fn table_vector(&self, v: &Vector3<f64>, angles: &AngleTuple) -> Vector3<f64> {
        self.apply_table(&Point3::from(*v), angles) - self.apply_table(&Point3::origin(), angles)
    }

    /// Translation axis coordinates that put the tool tip on `part`
    pub fn machine_position(
        &self,
        part: &Point3<f64>,
        angles: &AngleTuple,
        tool_length: f64,
    ) -> Point3<f64> {
        let table_point = match self.frame().workpiece() {
            Some(w) => w.apply_point(part),
            None => *part,
        };
        let target = self.apply_table(&table_point, angles);
        let tip = self.apply_head(&self.frame().tool_tip(tool_length), angles);
        Point3::from(self.frame().translation_inverse() * (target - tip))
    }

    /// Workpiece point under the tool tip for axis coordinates `machine`
    pub fn part_position(
        &self,
        machine: &Point3<f64>,
        angles: &AngleTuple,
        tool_length: f64,
    ) -> Point3<f64> {
        let d = Matrix3::from_columns(&self.frame().translation().directions);
        let tip = self.apply_head(&self.frame().tool_tip(tool_length), angles);
        let world = tip + d * machine.coords;
        let table_point = self.invert_table(&world, angles);
        match self.frame().workpiece() {
            Some(w) => w.invert_point(&table_point),
            None => table_point,
        }
    }

    /// Change of axis coordinates per unit tool motion along a workpiece
    /// direction, with the angles held
    pub fn axis_direction(&self, part_dir: &Vector3<f64>, angles: &AngleTuple) -> Vector3<f64> {
        let table_dir = self.to_table_frame(part_dir);
        self.frame().translation_inverse() * self.table_vector(&table_dir, angles)
    }

    /// First translation limit exceeded by `machine`, if any
    pub fn translation_limit_violation(&self, machine: &Point3<f64>) -> Option<LimitHit> {
        let t = self.frame().translation();
        (0..3).find_map(|i| {
            let v = machine[i];
            if v < t.min[i] - TRANSLATION_LIMIT_TOL {
                Some(LimitHit {
                    axis: LimitAxis::translation(i, false),
                    value: v,
                    limit: t.min[i],
                })
            } else if v > t.max[i] + TRANSLATION_LIMIT_TOL {
                Some(LimitHit {
                    axis: LimitAxis::translation(i, true),
                    value: v,
                    limit: t.max[i],
                })
            } else {
                None
            }
        })
    }

    /// First rotary limit exceeded by `angles_deg` (degrees), if any
    pub fn rotary_limit_violation(&self, angles_deg: &AngleTuple, tol_deg: f64) -> Option<LimitHit> {
        self.rotary_axes()
            .iter()
            .enumerate()
            .find_map(|(i, axis)| {
                let v = angles_deg.get(i)?;
                if axis.within_limits(v, tol_deg) {
                    None
                } else if v < axis.min_deg {
                    Some(LimitHit {
                        axis: LimitAxis::rotary(i, false),
                        value: v,
                        limit: axis.min_deg,
                    })
                } else {
                    Some(LimitHit {
                        axis: LimitAxis::rotary(i, true),
                        value: v,
                        limit: axis.max_deg,
                    })
                }
            })
    }

    /// Largest step `s >= 0` such that `machine + s * dir` stays within the
    /// translation limits; infinite when `dir` never reaches a limit
    pub fn retract_reach(&self, machine: &Point3<f64>, dir: &Vector3<f64>) -> f64 {
        let t = self.frame().translation();
        (0..3)
            .filter(|&i| dir[i].abs() > f64::EPSILON)
            .map(|i| {
                let bound = if dir[i] > 0.0 { t.max[i] } else { t.min[i] };
                ((bound - machine[i]) / dir[i]).max(0.0)
            })
            .fold(f64::INFINITY, f64::min)
    }
}

fn angle_of(angles: &AngleTuple, axis: usize) -> f64 {
    angles.get(axis).unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::axis::{RotaryAxis, TranslationAxes};
    use crate::machine::FrameDefinition;
    use axispost_core::Matrix4;
    use std::f64::consts::FRAC_PI_2;

    fn close(a: &Vector3<f64>, b: &Vector3<f64>) -> bool {
        (a - b).norm() < 1e-9
    }

    fn head_head() -> Machine {
        Machine::five_axis(
            FrameDefinition::default(),
            FiveAxisTopology::HeadHead,
            [
                RotaryAxis::new(Vector3::z(), Mounting::Head),
                RotaryAxis::new(Vector3::x(), Mounting::Head),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_chain_order_per_topology() {
        let m = head_head();
        let chain: Vec<_> = m.orientation_chain().iter().map(|l| l.axis).collect();
        assert_eq!(chain, vec![0, 1]);

        // Tilting trunnion on X carrying a rotary table on Z
        let tt_new = Machine::five_axis(
            FrameDefinition::default(),
            FiveAxisTopology::TableTableNew,
            [
                RotaryAxis::new(Vector3::x(), Mounting::Table),
                RotaryAxis::new(Vector3::z(), Mounting::Table),
            ],
        )
        .unwrap();
        let chain = tt_new.orientation_chain();
        assert_eq!(chain.iter().map(|l| l.axis).collect::<Vec<_>>(), vec![1, 0]);
        assert_eq!(chain[0].direction, -Vector3::z());

        // Same machine in the legacy layout lists the nested table first
        let tt_legacy = Machine::five_axis(
            FrameDefinition::default(),
            FiveAxisTopology::TableTableLegacy,
            [
                RotaryAxis::new(Vector3::z(), Mounting::Table),
                RotaryAxis::new(Vector3::x(), Mounting::Table),
            ],
        )
        .unwrap();
        let order: Vec<_> = tt_legacy.orientation_chain().iter().map(|l| l.axis).collect();
        assert_eq!(order, vec![0, 1]);
    }

    #[test]
    fn test_head_head_orientation() {
        let m = head_head();
        // Tilt about X by 90 deg turns Z into -Y, then about Z by 90 deg into X
        let o = m.orientation_from_angles(&AngleTuple::from_slice(&[FRAC_PI_2, FRAC_PI_2]));
        assert!(close(&o, &Vector3::x()), "{:?}", o);
    }

    #[test]
    fn test_table_rotation_reverses_orientation() {
        let m = Machine::default_five_axis().unwrap();
        // Table axis (0,0,-1) seen from the table is +Z: no effect on a vertical tool
        let o = m.orientation_from_angles(&AngleTuple::from_slice(&[0.7, 0.0]));
        assert!(close(&o, &Vector3::z()));
        // Head axis (0,-1,0) by 90 deg tilts Z towards -X
        let o = m.orientation_from_angles(&AngleTuple::from_slice(&[0.0, FRAC_PI_2]));
        assert!(close(&o, &-Vector3::x()), "{:?}", o);
    }

    #[test]
    fn test_machine_position_three_axis_with_tool_length() {
        let m = Machine::three_axis(FrameDefinition::default()).unwrap();
        let p = Point3::new(10.0, 20.0, 30.0);
        let c = m.machine_position(&p, &AngleTuple::zeros(0), 50.0);
        assert_eq!(c, Point3::new(10.0, 20.0, 80.0));
        let back = m.part_position(&c, &AngleTuple::zeros(0), 50.0);
        assert!((back - p).norm() < 1e-12);
    }

    #[test]
    fn test_machine_position_with_table_base_point() {
        let m = Machine::four_axis(
            FrameDefinition::default(),
            RotaryAxis::new(Vector3::x(), Mounting::Table)
                .with_base_point(Point3::new(0.0, 100.0, 0.0)),
        )
        .unwrap();
        let angles = AngleTuple::from_slice(&[std::f64::consts::PI]);
        let c = m.machine_position(&Point3::origin(), &angles, 0.0);
        assert!((c - Point3::new(0.0, 200.0, 0.0)).norm() < 1e-9);
        let back = m.part_position(&c, &angles, 0.0);
        assert!(back.coords.norm() < 1e-9);
    }

    #[test]
    fn test_workpiece_transform_roundtrip() {
        let frame = FrameDefinition {
            workpiece_transform: Some(Matrix4::new_translation(&Vector3::new(5.0, -3.0, 1.0))),
            ..FrameDefinition::default()
        };
        let m = Machine::five_axis(
            frame,
            FiveAxisTopology::HeadTable,
            [
                RotaryAxis::new(-Vector3::z(), Mounting::Table)
                    .with_base_point(Point3::new(1.0, 2.0, 0.0)),
                RotaryAxis::new(-Vector3::y(), Mounting::Head)
                    .with_base_point(Point3::new(0.0, 0.0, 40.0)),
            ],
        )
        .unwrap();
        let angles = AngleTuple::from_slice(&[0.4, -0.9]);
        let p = Point3::new(7.0, 8.0, 9.0);
        let c = m.machine_position(&p, &angles, 25.0);
        let back = m.part_position(&c, &angles, 25.0);
        assert!((back - p).norm() < 1e-9);
    }

    #[test]
    fn test_limit_checks() {
        let frame = FrameDefinition {
            translation: TranslationAxes::default().with_limits([-10.0; 3], [10.0; 3]),
            ..FrameDefinition::default()
        };
        let m = Machine::four_axis(
            frame,
            RotaryAxis::new(Vector3::x(), Mounting::Head).with_limits(-30.0, 30.0),
        )
        .unwrap();
        let hit = m
            .translation_limit_violation(&Point3::new(0.0, -11.0, 0.0))
            .unwrap();
        assert_eq!(hit.axis, LimitAxis::YMin);
        assert_eq!(hit.limit, -10.0);
        assert!(m.translation_limit_violation(&Point3::new(10.0, 0.0, 0.0)).is_none());

        let hit = m
            .rotary_limit_violation(&AngleTuple::from_slice(&[31.0]), 1e-4)
            .unwrap();
        assert_eq!(hit.axis, LimitAxis::R1Max);
        assert!(hit.into_error(Some(3)).to_string().contains("R1_MAX"));
        assert!(m
            .rotary_limit_violation(&AngleTuple::from_slice(&[30.00001]), 1e-4)
            .is_none());
    }

    #[test]
    fn test_retract_reach() {
        let frame = FrameDefinition {
            translation: TranslationAxes::default().with_limits([-10.0; 3], [10.0; 3]),
            ..FrameDefinition::default()
        };
        let m = Machine::three_axis(frame).unwrap();
        let reach = m.retract_reach(&Point3::new(0.0, 0.0, 4.0), &Vector3::z());
        assert!((reach - 6.0).abs() < 1e-12);
        let reach = m.retract_reach(&Point3::origin(), &Vector3::new(1.0, 1.0, 0.0).normalize());
        assert!((reach - 10.0 * 2f64.sqrt()).abs() < 1e-9);
        assert_eq!(m.retract_reach(&Point3::origin(), &Vector3::zeros()), f64::INFINITY);
    }

    #[test]
    fn test_nested_axis_direction_in_pose() {
        let tt = Machine::five_axis(
            FrameDefinition::default(),
            FiveAxisTopology::TableTableNew,
            [
                RotaryAxis::new(Vector3::x(), Mounting::Table),
                RotaryAxis::new(Vector3::z(), Mounting::Table),
            ],
        )
        .unwrap();
        let angles = AngleTuple::from_slice(&[FRAC_PI_2, 0.3]);
        // The rotary table rides on the trunnion
        let c = tt.rotary_direction_in_pose(1, &angles);
        assert!(close(&c, &-Vector3::y()), "{:?}", c);
        // The trunnion itself is carried by nothing
        assert!(close(&tt.rotary_direction_in_pose(0, &angles), &Vector3::x()));

        let hh = head_head();
        let b = hh.rotary_direction_in_pose(1, &AngleTuple::from_slice(&[FRAC_PI_2, 0.0]));
        assert!(close(&b, &Vector3::y()));
    }

    #[test]
    fn test_axis_direction_follows_table_rotation() {
        let m = Machine::four_axis(
            FrameDefinition::default(),
            RotaryAxis::new(Vector3::y(), Mounting::Table),
        )
        .unwrap();
        let dir = m.axis_direction(&Vector3::x(), &AngleTuple::from_slice(&[FRAC_PI_2]));
        assert!(close(&dir, &-Vector3::z()));
    }
}
