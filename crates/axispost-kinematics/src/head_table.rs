//! Head-and-table rotation strategy
//!
//! At a pole the free rotary angle can be chosen at will without changing
//! the tool orientation, but it still moves the translation axes. The
//! strategy picks that angle so one translation axis keeps its previous
//! coordinate, turning what would be a sweep across the machine into a
//! rotation of the table or head around the part.
//!
//! A translation coordinate is a pure sinusoid of the free angle,
//! `k(θ) = a·cos θ + b·sin θ + c`, so holding it is a 2D solve with two
//! branches (case I and case II).

use axispost_core::geometry::{clamped_acos, dominant_axis, normalize_angle_deg};
use axispost_core::{AngleTuple, Point3, Vector3};
use axispost_machine::Machine;
use axispost_settings::PostParameters;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, trace};

use crate::solver::{rebase_pole_value, Coupling};

/// Held coordinate has to be met to this accuracy (machine units)
const HOLD_TOL: f64 = 1e-6;

/// Translation axis absorbing the pole motion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    #[default]
    Undefined,
    UseXAxis,
    UseYAxis,
    UseZAxis,
}

impl Strategy {
    pub fn from_axis(axis: usize) -> Self {
        match axis {
            0 => Self::UseXAxis,
            1 => Self::UseYAxis,
            2 => Self::UseZAxis,
            _ => Self::Undefined,
        }
    }

    /// Translation axis index held by this strategy
    pub fn axis(self) -> Option<usize> {
        match self {
            Self::UseXAxis => Some(0),
            Self::UseYAxis => Some(1),
            Self::UseZAxis => Some(2),
            Self::Undefined => None,
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Undefined => "undefined",
            Self::UseXAxis => "hold X",
            Self::UseYAxis => "hold Y",
            Self::UseZAxis => "hold Z",
        };
        f.write_str(name)
    }
}

/// Branch of the 2D solve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Case {
    #[default]
    Undefined,
    CaseI,
    CaseII,
}

impl Case {
    /// Case I for a positive seed direction, case II for a negative one
    pub fn from_sign(sign: f64) -> Self {
        if sign >= 0.0 {
            Self::CaseI
        } else {
            Self::CaseII
        }
    }

    pub fn other(self) -> Self {
        match self {
            Self::CaseI => Self::CaseII,
            Self::CaseII => Self::CaseI,
            Self::Undefined => Self::Undefined,
        }
    }

    fn branch_sign(self) -> f64 {
        match self {
            Self::CaseII => -1.0,
            _ => 1.0,
        }
    }
}

/// Working plane, orthogonal to the free rotary axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Plane {
    #[default]
    XY,
    XZ,
    YZ,
}

impl Plane {
    /// Plane orthogonal to the dominant component of `dir`
    pub fn orthogonal_to(dir: &Vector3<f64>) -> Self {
        match dominant_axis(dir) {
            0 => Self::YZ,
            1 => Self::XZ,
            _ => Self::XY,
        }
    }

    /// Translation axis along the plane normal
    pub fn normal_axis(self) -> usize {
        match self {
            Self::YZ => 0,
            Self::XZ => 1,
            Self::XY => 2,
        }
    }
}

/// Head/table strategy state, carried in the continuity state
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct HeadTableState {
    pub strategy: Strategy,
    pub case: Case,
    /// Sign of the first free-angle motion once the direction lock engaged
    pub direction_sign: Option<f64>,
    /// Ordered candidate solutions
    pub order: Vec<(Strategy, Case)>,
    /// Position of the active solution in `order`
    pub order_pos: usize,
    pub plane: Plane,
}

impl HeadTableState {
    pub fn is_active(&self) -> bool {
        self.strategy != Strategy::Undefined
    }
}

/// A move sitting at a pole whose free angle is to be chosen
#[derive(Debug, Clone, Copy)]
pub struct PoleMove<'a> {
    /// Solved angles (degrees) with the free angle at some representative value
    pub angles_deg: &'a AngleTuple,
    pub axis: usize,
    pub coupling: Option<Coupling>,
    /// Tool tip in workpiece coordinates
    pub part: &'a Point3<f64>,
    pub tool_length: f64,
}

impl PoleMove<'_> {
    /// Angles with the free axis moved to `theta_deg`
    pub fn angles_at(&self, theta_deg: f64) -> AngleTuple {
        let mut angles = *self.angles_deg;
        rebase_pole_value(&mut angles, self.axis, self.coupling, theta_deg);
        angles
    }

    /// Translation axis coordinates with the free axis at `theta_deg`
    pub fn machine_at(&self, machine: &Machine, theta_deg: f64) -> Point3<f64> {
        let angles = self.angles_at(theta_deg).to_radians();
        machine.machine_position(self.part, &angles, self.tool_length)
    }
}

/// Head/table strategy for one machine and parameter set
#[derive(Debug, Clone, Copy)]
pub struct HeadTableStrategy<'a> {
    machine: &'a Machine,
    params: &'a PostParameters,
}

impl<'a> HeadTableStrategy<'a> {
    pub fn new(machine: &'a Machine, params: &'a PostParameters) -> Self {
        Self { machine, params }
    }

    /// Machine-frame direction of the free rotary axis in the move's pose
    pub fn table_dir(&self, mv: &PoleMove<'_>) -> Vector3<f64> {
        self.machine
            .rotary_direction_in_pose(mv.axis, &mv.angles_deg.to_radians())
    }

    /// Seed solution from the configured translation axis
    ///
    /// The custom direction picks its dominant component, skipping the
    /// axis normal to `plane`.
    pub fn solution_based_on_translation_axis(
        &self,
        plane: Option<Plane>,
        custom_direction: Option<Vector3<f64>>,
    ) -> (Strategy, Case) {
        let (axis, sign) = match self.params.solution_for_start_translation.axis_and_sign() {
            Some(seed) => seed,
            None => {
                let dir = custom_direction.unwrap_or(self.params.custom_trans_axis_dir);
                let skip = plane.map(Plane::normal_axis);
                let axis = (0..3)
                    .filter(|&i| Some(i) != skip)
                    .fold(None, |best: Option<usize>, i| match best {
                        Some(b) if dir[b].abs() >= dir[i].abs() => Some(b),
                        _ => Some(i),
                    })
                    .unwrap_or(0);
                (axis, if dir[axis] < 0.0 { -1.0 } else { 1.0 })
            }
        };
        (Strategy::from_axis(axis), Case::from_sign(sign))
    }

    /// Ordered candidate list for `plane`: the seed, its other case, then
    /// the remaining in-plane axes
    pub fn solution_order(
        &self,
        plane: Plane,
        custom_direction: Option<Vector3<f64>>,
    ) -> Vec<(Strategy, Case)> {
        let normal = plane.normal_axis();
        let (seed, case) = self.solution_based_on_translation_axis(Some(plane), custom_direction);
        let mut order = Vec::with_capacity(4);
        if seed.axis().is_some_and(|a| a != normal) {
            order.push((seed, case));
            order.push((seed, case.other()));
        }
        for axis in (0..3).filter(|&a| a != normal) {
            let strategy = Strategy::from_axis(axis);
            for c in [Case::CaseI, Case::CaseII] {
                if !order.contains(&(strategy, c)) {
                    order.push((strategy, c));
                }
            }
        }
        order
    }

    /// Forget the active strategy; with `reset_order` the candidate list is
    /// rebuilt on the next move
    pub fn reset_strategy(
        &self,
        state: &mut HeadTableState,
        reset_order: bool,
        custom_direction: Option<Vector3<f64>>,
    ) {
        state.strategy = Strategy::Undefined;
        state.case = Case::Undefined;
        state.direction_sign = None;
        if reset_order {
            state.order = self.solution_order(state.plane, custom_direction);
            state.order_pos = 0;
        }
    }

    /// Free angle holding `target` on the strategy's axis, if one exists
    ///
    /// `previous_deg` is the free angle of the previous move; the result is
    /// the equivalent closest to it.
    pub fn check_sol(
        &self,
        state: &HeadTableState,
        mv: &PoleMove<'_>,
        strategy: Strategy,
        case: Case,
        previous_deg: f64,
        target: f64,
    ) -> Option<f64> {
        let k = strategy.axis()?;
        let sample = |offset: f64| mv.machine_at(self.machine, previous_deg + offset)[k];
        let (k0, k1, k2) = (sample(0.0), sample(90.0), sample(180.0));
        let center = 0.5 * (k0 + k2);
        let a = 0.5 * (k0 - k2);
        let b = k1 - center;
        let radius = a.hypot(b);

        let theta = if radius < HOLD_TOL {
            if (target - center).abs() > HOLD_TOL {
                return None;
            }
            previous_deg
        } else {
            let ratio = (target - center) / radius;
            if ratio.abs() > 1.0 + 1e-12 {
                return None;
            }
            let psi = b.atan2(a);
            let phi = psi + case.branch_sign() * clamped_acos(ratio);
            previous_deg + normalize_angle_deg(phi.to_degrees())
        };

        if (sample(theta - previous_deg) - target).abs() > HOLD_TOL {
            trace!("{} {:?} misses the held coordinate", strategy, case);
            return None;
        }
        if self.params.machine_limits.rotation() {
            let angles = mv.angles_at(theta);
            if self
                .machine
                .rotary_limit_violation(&angles, self.params.angle_tol_for_mach_limits)
                .is_some()
            {
                return None;
            }
        }
        if self.params.avoid_rotation_axis_direction_change {
            if let Some(sign) = state.direction_sign {
                if (theta - previous_deg) * sign < -1e-9 {
                    return None;
                }
            }
        }
        Some(theta)
    }

    /// Walk the candidate list from the active position onwards and make the
    /// first working solution active
    pub fn change_strategy(
        &self,
        state: &mut HeadTableState,
        mv: &PoleMove<'_>,
        previous_deg: f64,
        previous_machine: &Point3<f64>,
    ) -> Option<f64> {
        let n = state.order.len();
        for step in 0..n {
            let pos = (state.order_pos + step) % n;
            let (strategy, case) = state.order[pos];
            let Some(axis) = strategy.axis() else {
                continue;
            };
            if let Some(theta) =
                self.check_sol(state, mv, strategy, case, previous_deg, previous_machine[axis])
            {
                if state.strategy != strategy || state.case != case {
                    debug!("Head/table strategy switched to {} ({:?})", strategy, case);
                }
                state.strategy = strategy;
                state.case = case;
                state.order_pos = pos;
                return Some(theta);
            }
        }
        None
    }

    /// Free angle (degrees) for a pole move
    ///
    /// Falls back to primitive rotation, the previous angle, when travel
    /// limiting is off, nothing precedes the move, or no strategy holds.
    pub fn adjust_move(
        &self,
        state: &mut HeadTableState,
        mv: &PoleMove<'_>,
        previous_deg: f64,
        previous_machine: Option<&Point3<f64>>,
    ) -> f64 {
        if !self.params.limit_linear_axis_travel {
            return previous_deg;
        }
        let Some(previous_machine) = previous_machine else {
            return previous_deg;
        };

        if !state.is_active() {
            let plane = Plane::orthogonal_to(&self.table_dir(mv));
            if state.order.is_empty() || plane != state.plane {
                state.plane = plane;
                state.order = self.solution_order(plane, None);
                state.order_pos = 0;
            }
        }

        match self.change_strategy(state, mv, previous_deg, previous_machine) {
            Some(theta) => {
                let step = theta - previous_deg;
                if self.params.avoid_rotation_axis_direction_change
                    && state.direction_sign.is_none()
                    && step.abs() > 1e-9
                {
                    state.direction_sign = Some(step.signum());
                }
                theta
            }
            None => {
                debug!("No head/table strategy holds, using primitive rotation");
                state.strategy = Strategy::Undefined;
                state.case = Case::Undefined;
                previous_deg
            }
        }
    }
}
