//! Mutable runtime state, one slot per registry point.
//!
//! The store is owned exclusively by the scheduler; everything else
//! sees values only through published MQTT state topics.

use std::time::Instant;

use registry::{PointSource, Registry};
use types::Value;

#[derive(Debug, Clone, Default)]
pub struct PointState {
    pub last_value: Option<Value>,
    pub last_update: Option<Instant>,
    /// Set when a write may have invalidated other readings; cleared
    /// after one full read pass.
    pub force_refresh: bool,
}

#[derive(Debug)]
pub struct StateStore {
    states: Vec<PointState>,
}

impl StateStore {
    /// Seeds one slot per point, in registry order. Command-only
    /// points start from their declared default (the interlock starts
    /// disarmed); everything else starts unknown.
    pub fn new(registry: &Registry) -> Self {
        let states = registry
            .iter()
            .map(|point| {
                let last_value = match &point.source {
                    PointSource::Command { default } => default.clone(),
                    _ => None,
                };
                PointState { last_value, ..PointState::default() }
            })
            .collect();
        Self { states }
    }

    pub fn get(&self, position: usize) -> &PointState {
        &self.states[position]
    }

    pub fn get_mut(&mut self, position: usize) -> &mut PointState {
        &mut self.states[position]
    }

    pub fn value(&self, position: usize) -> Option<&Value> {
        self.states[position].last_value.as_ref()
    }

    pub fn mark_all_for_refresh(&mut self) {
        for state in &mut self.states {
            state.force_refresh = true;
        }
    }

    pub fn clear_refresh_flags(&mut self) {
        for state in &mut self.states {
            state.force_refresh = false;
        }
    }
}
