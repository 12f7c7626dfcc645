//! Automation scheduling (spec §4.7): scheduled per-point automation and
//! real-time CC-lane evaluation.

use std::collections::HashMap;

use crate::collaborators::{
    EffectRegistry, InstrumentRegistry, MixerRegistry, ParamsMap,
};
use crate::config::cc_default;
use crate::model::{AutomationLane, InstrumentId};

/// Parsed `"{mixer|instrument|effect}.{id}.{parameter}"` scheduled-automation
/// target (spec §4.7 mode 1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AutomationTarget {
    Mixer { channel_id: String, parameter: String },
    Instrument { instrument_id: String, parameter: String },
    Effect { effect_id: String, parameter: String },
}

impl AutomationTarget {
    pub fn parse(raw: &str) -> Option<Self> {
        let mut parts = raw.splitn(3, '.');
        let kind = parts.next()?;
        let id = parts.next()?;
        let parameter = parts.next()?;
        match kind {
            "mixer" => Some(AutomationTarget::Mixer {
                channel_id: id.to_string(),
                parameter: parameter.to_string(),
            }),
            "instrument" => Some(AutomationTarget::Instrument {
                instrument_id: id.to_string(),
                parameter: parameter.to_string(),
            }),
            "effect" => Some(AutomationTarget::Effect {
                effect_id: id.to_string(),
                parameter: parameter.to_string(),
            }),
            _ => None,
        }
    }
}

/// Collaborator bundle needed to resolve a scheduled-automation target to a
/// live setter call.
pub struct AutomationSinks<'a> {
    pub instruments: &'a dyn InstrumentRegistry,
    pub effects: &'a dyn EffectRegistry,
    pub mixer: &'a dyn MixerRegistry,
}

/// Apply one resolved point to whichever handle the target names. Missing
/// handles are skipped silently — the same "contained, logged" policy as a
/// missing instrument reference elsewhere (spec §7).
pub fn apply_scheduled_point(target: &AutomationTarget, value: f64, at_time: f64, sinks: &AutomationSinks) {
    match target {
        AutomationTarget::Instrument { instrument_id, parameter } => {
            if let Some(handle) = sinks.instruments.get(instrument_id) {
                let mut params = ParamsMap::new();
                params.insert(parameter.clone(), value);
                handle.apply_automation(&params, at_time);
            } else {
                log::warn!("scheduled automation: no instrument handle for {instrument_id}");
            }
        }
        AutomationTarget::Effect { effect_id, parameter } => {
            if let Some(handle) = sinks.effects.get(effect_id) {
                let mut params = ParamsMap::new();
                params.insert(parameter.clone(), value);
                handle.update_params(&params);
            } else {
                log::warn!("scheduled automation: no effect handle for {effect_id}");
            }
        }
        AutomationTarget::Mixer { channel_id, parameter } => {
            if let Some(handle) = sinks.mixer.get(channel_id) {
                match parameter.as_str() {
                    "mute" => handle.set_mute(value != 0.0),
                    "solo" => handle.set_solo(value != 0.0),
                    other => handle.set_param(other, value),
                }
            } else {
                log::warn!("scheduled automation: no mixer channel for {channel_id}");
            }
        }
    }
}

/// CC-to-parameter mapping table (spec §4.7).
pub fn map_cc_to_param(cc_number: u8, raw_value: f64) -> Option<(&'static str, f64)> {
    match cc_number {
        1 => Some(("mod_wheel", raw_value)),
        7 => Some(("volume", raw_value / 127.0)),
        10 => Some(("pan", (raw_value - 64.0) / 64.0)),
        11 => Some(("expression", raw_value / 127.0)),
        71 => Some(("filter_resonance", raw_value)),
        74 => Some(("filter_cutoff", raw_value)),
        _ => None,
    }
}

/// A lane's value at `step`, falling back to the per-CC default once
/// playback passes its last point (spec §4.7: "use a per-CC default", which
/// differs from [`AutomationLane::get_value_at`]'s own hold-last-value
/// behavior used by scheduled/editor contexts).
pub fn evaluate_realtime(lane: &AutomationLane, step: f64) -> Option<f64> {
    if !lane.has_points() {
        return None;
    }
    let last = lane.last_point().expect("has_points checked above");
    if step > last.time_step {
        Some(cc_default(lane.cc_number) as f64)
    } else {
        lane.get_value_at(step)
    }
}

/// Tracks which instruments currently have live CC-lane automation and
/// drives their per-tick evaluation (spec §4.7 "Start/stop").
#[derive(Default)]
pub struct RealtimeAutomation {
    active: HashMap<InstrumentId, Vec<AutomationLane>>,
}

impl RealtimeAutomation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers only lanes that have at least one point (spec §4.4 pattern
    /// mode step 4).
    pub fn start(&mut self, instrument_id: impl Into<InstrumentId>, lanes: Vec<AutomationLane>) {
        let filtered: Vec<AutomationLane> = lanes.into_iter().filter(|l| l.has_points()).collect();
        if filtered.is_empty() {
            return;
        }
        self.active.insert(instrument_id.into(), filtered);
    }

    pub fn stop_all(&mut self) {
        self.active.clear();
    }

    pub fn stop_instrument(&mut self, instrument_id: &str) {
        self.active.remove(instrument_id);
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    /// Evaluate every registered lane at `current_step` and apply the mapped
    /// parameters through each instrument's `apply_automation` (spec §4.7
    /// mode 2).
    pub fn tick(&self, current_step: f64, scheduler_event_time: f64, instruments: &dyn InstrumentRegistry) {
        for (instrument_id, lanes) in &self.active {
            let mut params = ParamsMap::new();
            for lane in lanes {
                if let Some(raw) = evaluate_realtime(lane, current_step) {
                    if let Some((param, value)) = map_cc_to_param(lane.cc_number, raw) {
                        params.insert(param.to_string(), value);
                    }
                }
            }
            if params.is_empty() {
                continue;
            }
            if let Some(handle) = instruments.get(instrument_id) {
                handle.apply_automation(&params, scheduler_event_time);
            }
        }
    }
}
