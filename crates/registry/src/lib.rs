//! Immutable description of every point the bridge knows about.
//!
//! The registry is built once at startup from a declarative list of
//! [`Point`]s and never mutated afterwards. Build-time validation
//! replaces the implicit assumptions a hand-maintained table tends to
//! accumulate: duplicate names, derived points referencing entries
//! declared after themselves, and dangerous writers without a guard
//! are all rejected before the first bus transaction.

use std::collections::HashMap;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use types::Value;

pub mod codec;

pub use codec::{CodecError, EncodedWrite, ScaleContext};

/// Home Assistant component the point maps to; decides the discovery
/// shape and how write payloads are decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Sensor,
    Number,
    Select,
    Switch,
    Button,
}

impl Category {
    pub fn component(&self) -> &'static str {
        match self {
            Category::Sensor => "sensor",
            Category::Number => "number",
            Category::Select => "select",
            Category::Switch => "switch",
            Category::Button => "button",
        }
    }
}

/// When the scheduler re-reads a point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshPolicy {
    /// Re-read whenever the interval has elapsed.
    Every(Duration),
    /// Read a single time at startup (firmware versions, serial number).
    Once,
    /// Never read on a schedule; the value only moves through the
    /// write path or a forced refresh.
    Never,
}

/// How raw registers become a [`Value`].
#[derive(Debug, Clone, PartialEq)]
pub enum ReadKind {
    /// Single register times `scale`, rounded to `decimals`.
    Scaled { scale: f64, signed: bool, decimals: u32 },
    /// Single register reported verbatim.
    Integer { signed: bool },
    /// NUL-padded ASCII over `count` registers.
    Text,
    /// `v{:.2}` firmware version from `regs[word] / 100`.
    Version { word: usize },
    /// Raw value mapped to a label; unmapped values fail the read.
    Enum { options: Vec<(u16, String)> },
    /// `(raw / 10) * battery_rate`, the shared voltage divisor.
    RateScaled,
    /// Three packed registers: `20YY-MM-DD HH:MM:SS`.
    DateTime,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReadOp {
    pub register: u16,
    pub count: u16,
    pub kind: ReadKind,
}

impl ReadOp {
    pub fn scaled(register: u16, scale: f64) -> Self {
        Self {
            register,
            count: 1,
            kind: ReadKind::Scaled { scale, signed: false, decimals: 1 },
        }
    }

    pub fn scaled_signed(register: u16, scale: f64) -> Self {
        Self {
            register,
            count: 1,
            kind: ReadKind::Scaled { scale, signed: true, decimals: 1 },
        }
    }

    pub fn integer(register: u16) -> Self {
        Self { register, count: 1, kind: ReadKind::Integer { signed: false } }
    }

    pub fn integer_signed(register: u16) -> Self {
        Self { register, count: 1, kind: ReadKind::Integer { signed: true } }
    }

    pub fn text(register: u16, registers: u16) -> Self {
        Self { register, count: registers, kind: ReadKind::Text }
    }

    pub fn version(register: u16, count: u16, word: usize) -> Self {
        Self { register, count, kind: ReadKind::Version { word } }
    }

    pub fn enumerated(register: u16, options: &[(u16, &str)]) -> Self {
        Self {
            register,
            count: 1,
            kind: ReadKind::Enum {
                options: options
                    .iter()
                    .map(|(raw, label)| (*raw, label.to_string()))
                    .collect(),
            },
        }
    }

    pub fn rate_scaled(register: u16) -> Self {
        Self { register, count: 1, kind: ReadKind::RateScaled }
    }

    pub fn date_time(register: u16) -> Self {
        Self { register, count: 3, kind: ReadKind::DateTime }
    }
}

/// Pure function of other points' cached values; never touches the bus.
/// Results are rounded to one decimal place.
#[derive(Debug, Clone, PartialEq)]
pub enum DerivedExpr {
    Product { a: String, b: String },
    Sum { terms: Vec<String> },
    Difference { minuend: String, subtrahend: String },
}

impl DerivedExpr {
    pub fn product(a: &str, b: &str) -> Self {
        Self::Product { a: a.to_string(), b: b.to_string() }
    }

    pub fn sum(terms: &[&str]) -> Self {
        Self::Sum { terms: terms.iter().map(|term| term.to_string()).collect() }
    }

    pub fn difference(minuend: &str, subtrahend: &str) -> Self {
        Self::Difference {
            minuend: minuend.to_string(),
            subtrahend: subtrahend.to_string(),
        }
    }

    pub fn dependencies(&self) -> Vec<&str> {
        match self {
            DerivedExpr::Product { a, b } => vec![a, b],
            DerivedExpr::Sum { terms } => terms.iter().map(String::as_str).collect(),
            DerivedExpr::Difference { minuend, subtrahend } => vec![minuend, subtrahend],
        }
    }
}

/// Where a point's value comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum PointSource {
    /// One bus transaction per refresh.
    Register(ReadOp),
    /// Resolved from the state store, no bus traffic.
    Derived(DerivedExpr),
    /// Exists only through the write path (the write guard, stateless
    /// switches). `default` seeds the state store at startup.
    Command { default: Option<Value> },
}

/// How an external payload becomes a register write.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    /// Numeric payload divided by `scale` (and the battery rate when
    /// `rate_scaled`); range-checked before any bus transaction.
    Number { register: u16, scale: f64, rate_scaled: bool, min: f64, max: f64 },
    /// Option label mapped to its register value.
    Select { register: u16, options: Vec<(u16, String)> },
    /// `ON`/`OFF`-style payload mapped to 1/0.
    Switch { register: u16 },
    /// Fixed trigger value; the payload is ignored (buttons).
    Trigger { register: u16, value: u16 },
    /// The danger interlock: no bus transaction, the validated payload
    /// is stored directly.
    Arm { options: Vec<String>, armed: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct WriteSpec {
    pub op: WriteOp,
    /// A successful write invalidates other readings and forces a full
    /// refresh pass.
    pub full_refresh: bool,
}

/// Discovery metadata serialized into the retained config payload.
/// Everything here is presentation only; `None` fields are omitted.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DiscoveryMeta {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit_of_measurement: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_class: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_class: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload_on: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload_off: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload_press: Option<String>,
}

impl DiscoveryMeta {
    pub fn named(name: &str) -> Self {
        Self { name: name.to_string(), ..Self::default() }
    }

    pub fn unit(mut self, unit: &str) -> Self {
        self.unit_of_measurement = Some(unit.to_string());
        self
    }

    pub fn device_class(mut self, class: &str) -> Self {
        self.device_class = Some(class.to_string());
        self
    }

    pub fn state_class(mut self, class: &str) -> Self {
        self.state_class = Some(class.to_string());
        self
    }

    pub fn icon(mut self, icon: &str) -> Self {
        self.icon = Some(icon.to_string());
        self
    }

    pub fn entity_category(mut self, category: &str) -> Self {
        self.entity_category = Some(category.to_string());
        self
    }

    pub fn range(mut self, min: f64, max: f64, step: f64) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self.step = Some(step);
        self
    }

    pub fn options(mut self, options: &[&str]) -> Self {
        self.options = Some(options.iter().map(|option| option.to_string()).collect());
        self
    }

    pub fn switch_payloads(mut self, on: &str, off: &str) -> Self {
        self.payload_on = Some(on.to_string());
        self.payload_off = Some(off.to_string());
        self
    }

    pub fn press_payload(mut self, press: &str) -> Self {
        self.payload_press = Some(press.to_string());
        self
    }
}

/// One named, independently schedulable unit of device state.
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    pub name: String,
    pub category: Category,
    pub enabled: bool,
    pub refresh: RefreshPolicy,
    pub source: PointSource,
    pub write: Option<WriteSpec>,
    pub dangerous: bool,
    pub meta: DiscoveryMeta,
}

impl Point {
    pub fn new(
        name: &str,
        category: Category,
        source: PointSource,
        refresh: RefreshPolicy,
        meta: DiscoveryMeta,
    ) -> Self {
        Self {
            name: name.to_string(),
            category,
            enabled: true,
            refresh,
            source,
            write: None,
            dangerous: false,
            meta,
        }
    }

    pub fn sensor(name: &str, op: ReadOp, refresh: RefreshPolicy, meta: DiscoveryMeta) -> Self {
        Self::new(name, Category::Sensor, PointSource::Register(op), refresh, meta)
    }

    pub fn derived(
        name: &str,
        expr: DerivedExpr,
        refresh: RefreshPolicy,
        meta: DiscoveryMeta,
    ) -> Self {
        Self::new(name, Category::Sensor, PointSource::Derived(expr), refresh, meta)
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn writable(mut self, op: WriteOp) -> Self {
        self.write = Some(WriteSpec { op, full_refresh: false });
        self
    }

    pub fn with_full_refresh(mut self) -> Self {
        if let Some(spec) = self.write.as_mut() {
            spec.full_refresh = true;
        }
        self
    }

    pub fn dangerous(mut self) -> Self {
        self.dangerous = true;
        self
    }

    pub fn is_button(&self) -> bool {
        self.category == Category::Button
    }

    /// True for points whose value never comes from the bus.
    pub fn is_command_only(&self) -> bool {
        matches!(self.source, PointSource::Command { .. })
    }
}

/// The point that gates dangerous writes.
#[derive(Debug, Clone, PartialEq)]
pub struct Interlock {
    pub name: String,
    pub armed: String,
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("duplicate point name '{0}'")]
    DuplicatePoint(String),
    #[error("point '{point}' depends on unknown point '{dependency}'")]
    UnknownDependency { point: String, dependency: String },
    #[error("point '{point}' depends on '{dependency}' which is declared later")]
    ForwardDependency { point: String, dependency: String },
    #[error("dangerous point '{0}' has no writer")]
    DangerousWithoutWriter(String),
    #[error("dangerous points declared but no interlock point exists")]
    MissingInterlock,
    #[error("more than one interlock point declared ('{0}' and '{1}')")]
    MultipleInterlocks(String, String),
    #[error("command-only point '{0}' has no writer")]
    CommandWithoutWriter(String),
}

/// Validated, ordered, immutable set of points.
#[derive(Debug, Clone)]
pub struct Registry {
    points: Vec<Point>,
    index: HashMap<String, usize>,
    interlock: Option<Interlock>,
}

impl Registry {
    /// Validates the declarative point list. Derived dependencies must
    /// name points declared earlier, which makes the dependency graph a
    /// DAG by construction and lets the scheduler resolve everything in
    /// one forward pass.
    pub fn build(points: Vec<Point>) -> Result<Self, RegistryError> {
        let mut index = HashMap::with_capacity(points.len());
        for (position, point) in points.iter().enumerate() {
            if index.insert(point.name.clone(), position).is_some() {
                return Err(RegistryError::DuplicatePoint(point.name.clone()));
            }
        }

        let mut interlock: Option<Interlock> = None;
        for (position, point) in points.iter().enumerate() {
            if let PointSource::Derived(expr) = &point.source {
                for dependency in expr.dependencies() {
                    match index.get(dependency) {
                        None => {
                            return Err(RegistryError::UnknownDependency {
                                point: point.name.clone(),
                                dependency: dependency.to_string(),
                            });
                        }
                        Some(&dep_position) if dep_position >= position => {
                            return Err(RegistryError::ForwardDependency {
                                point: point.name.clone(),
                                dependency: dependency.to_string(),
                            });
                        }
                        Some(_) => {}
                    }
                }
            }

            if point.dangerous && point.write.is_none() {
                return Err(RegistryError::DangerousWithoutWriter(point.name.clone()));
            }

            if point.is_command_only() && point.write.is_none() {
                return Err(RegistryError::CommandWithoutWriter(point.name.clone()));
            }

            if let Some(WriteSpec { op: WriteOp::Arm { armed, .. }, .. }) = &point.write {
                if let Some(existing) = &interlock {
                    return Err(RegistryError::MultipleInterlocks(
                        existing.name.clone(),
                        point.name.clone(),
                    ));
                }
                interlock = Some(Interlock {
                    name: point.name.clone(),
                    armed: armed.clone(),
                });
            }
        }

        let has_dangerous = points.iter().any(|point| point.enabled && point.dangerous);
        if has_dangerous && interlock.is_none() {
            return Err(RegistryError::MissingInterlock);
        }

        debug!(points = points.len(), "registry built");
        Ok(Self { points, index, interlock })
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Point> {
        self.points.iter()
    }

    pub fn point(&self, position: usize) -> &Point {
        &self.points[position]
    }

    pub fn get(&self, name: &str) -> Option<(usize, &Point)> {
        let position = *self.index.get(name)?;
        Some((position, &self.points[position]))
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn interlock(&self) -> Option<&Interlock> {
        self.interlock.as_ref()
    }

    /// Points the discovery publisher and scheduler actually act on.
    pub fn enabled_points(&self) -> impl Iterator<Item = &Point> {
        self.points.iter().filter(|point| point.enabled)
    }
}
