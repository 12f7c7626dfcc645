//! Automation lanes (spec §3, §4.7): ordered points plus an interpolation
//! curve, queried by step position.

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AutomationPoint {
    pub time_step: f64,
    pub value: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interpolation {
    Linear,
    Exponential,
    Logarithmic,
    Bezier,
    Cubic,
    Step,
    EaseIn,
    EaseOut,
    EaseInOut,
}

impl Interpolation {
    /// Shape a normalized `t ∈ [0, 1]` progress fraction into the curve's
    /// own progress fraction. `Step` is handled separately by the caller
    /// since it does not blend between `from` and `to` at all.
    fn shape(self, t: f64) -> f64 {
        match self {
            Interpolation::Linear => t,
            Interpolation::Exponential => t * t,
            Interpolation::Logarithmic => 1.0 - (1.0 - t) * (1.0 - t),
            Interpolation::Bezier => t * t * (3.0 - 2.0 * t),
            Interpolation::Cubic => t * t * t,
            Interpolation::Step => 0.0, // unused; see AutomationLane::get_value_at
            Interpolation::EaseIn => t * t * t * t,
            Interpolation::EaseOut => 1.0 - (1.0 - t).powi(4),
            Interpolation::EaseInOut => {
                if t < 0.5 {
                    2.0 * t * t
                } else {
                    1.0 - (-2.0 * t + 2.0).powi(2) / 2.0
                }
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct AutomationLane {
    pub cc_number: u8,
    pub interpolation: Interpolation,
    /// Sorted ascending by `time_step`.
    points: Vec<AutomationPoint>,
}

impl AutomationLane {
    pub fn new(cc_number: u8, interpolation: Interpolation) -> Self {
        Self {
            cc_number,
            interpolation,
            points: Vec::new(),
        }
    }

    pub fn with_points(mut self, points: Vec<AutomationPoint>) -> Self {
        self.points = points;
        self.points
            .sort_by(|a, b| a.time_step.partial_cmp(&b.time_step).unwrap());
        self
    }

    pub fn points(&self) -> &[AutomationPoint] {
        &self.points
    }

    pub fn has_points(&self) -> bool {
        !self.points.is_empty()
    }

    pub fn last_point(&self) -> Option<&AutomationPoint> {
        self.points.last()
    }

    /// Interpolated value at `step`. `None` when the lane has no points at
    /// all (spec §3: "`get_value_at(step)` returns `null` when no points
    /// exist"). Past the last point, the caller is expected to fall back to
    /// a per-CC default (spec §4.7) — this function simply holds the last
    /// point's value.
    pub fn get_value_at(&self, step: f64) -> Option<f64> {
        if self.points.is_empty() {
            return None;
        }
        if step <= self.points[0].time_step {
            return Some(self.points[0].value);
        }
        let last = self.points.last().unwrap();
        if step >= last.time_step {
            return Some(last.value);
        }

        let next_idx = self.points.partition_point(|p| p.time_step <= step);
        let prev = &self.points[next_idx - 1];
        let next = &self.points[next_idx];

        if self.interpolation == Interpolation::Step {
            return Some(prev.value);
        }

        let span = next.time_step - prev.time_step;
        let t = if span > 0.0 {
            (step - prev.time_step) / span
        } else {
            1.0
        };
        let shaped = self.interpolation.shape(t);
        Some(prev.value + (next.value - prev.value) * shaped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lane(interp: Interpolation) -> AutomationLane {
        AutomationLane::new(7, interp).with_points(vec![
            AutomationPoint { time_step: 0.0, value: 0.0 },
            AutomationPoint { time_step: 10.0, value: 100.0 },
        ])
    }

    #[test]
    fn empty_lane_returns_none() {
        let lane = AutomationLane::new(7, Interpolation::Linear);
        assert_eq!(lane.get_value_at(5.0), None);
    }

    #[test]
    fn linear_midpoint_is_halfway() {
        let lane = lane(Interpolation::Linear);
        assert_eq!(lane.get_value_at(5.0), Some(50.0));
    }

    #[test]
    fn holds_before_first_and_after_last_point() {
        let lane = lane(Interpolation::Linear);
        assert_eq!(lane.get_value_at(-5.0), Some(0.0));
        assert_eq!(lane.get_value_at(50.0), Some(100.0));
    }

    #[test]
    fn step_holds_previous_value_until_next_point() {
        let lane = lane(Interpolation::Step);
        assert_eq!(lane.get_value_at(9.9), Some(0.0));
        assert_eq!(lane.get_value_at(10.0), Some(100.0));
    }

    #[test]
    fn exponential_is_below_linear_at_midpoint() {
        let lane = lane(Interpolation::Exponential);
        assert!(lane.get_value_at(5.0).unwrap() < 50.0);
    }

    #[test]
    fn logarithmic_is_above_linear_at_midpoint() {
        let lane = lane(Interpolation::Logarithmic);
        assert!(lane.get_value_at(5.0).unwrap() > 50.0);
    }

    #[test]
    fn endpoints_are_exact_for_every_curve() {
        for interp in [
            Interpolation::Linear,
            Interpolation::Exponential,
            Interpolation::Logarithmic,
            Interpolation::Bezier,
            Interpolation::Cubic,
            Interpolation::EaseIn,
            Interpolation::EaseOut,
            Interpolation::EaseInOut,
        ] {
            let lane = lane(interp);
            assert_eq!(lane.get_value_at(0.0), Some(0.0));
            assert_eq!(lane.get_value_at(10.0), Some(100.0));
        }
    }
}
