use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::{ConfigError, RenderError};
use crate::pixel::Pixel;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParamKind {
    Float,
    Integer,
    Bool,
    Text,
}

impl fmt::Display for ParamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ParamKind::Float => "float",
            ParamKind::Integer => "integer",
            ParamKind::Bool => "bool",
            ParamKind::Text => "text",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ParamValue {
    Float(f64),
    Integer(i64),
    Bool(bool),
    Text(String),
}

impl ParamValue {
    /// Parses a control payload. The formats do not depend on the locale:
    /// decimal floats and integers, `true`/`false` (plus the usual short
    /// spellings), and text taken verbatim.
    pub fn parse(kind: ParamKind, payload: &str) -> Result<ParamValue, String> {
        let trimmed = payload.trim();
        match kind {
            ParamKind::Float => trimmed
                .parse::<f64>()
                .map(ParamValue::Float)
                .map_err(|err| err.to_string()),
            ParamKind::Integer => trimmed
                .parse::<i64>()
                .map(ParamValue::Integer)
                .map_err(|err| err.to_string()),
            ParamKind::Bool => match trimmed {
                "1" | "t" | "T" | "true" | "TRUE" | "True" => Ok(ParamValue::Bool(true)),
                "0" | "f" | "F" | "false" | "FALSE" | "False" => Ok(ParamValue::Bool(false)),
                _ => Err("expected true or false".to_string()),
            },
            ParamKind::Text => Ok(ParamValue::Text(payload.to_string())),
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Float(v) => write!(f, "{v}"),
            ParamValue::Integer(v) => write!(f, "{v}"),
            ParamValue::Bool(v) => write!(f, "{v}"),
            ParamValue::Text(v) => f.write_str(v),
        }
    }
}

/// Borrowed storage of one parameter inside an effect.
pub enum Slot<'a> {
    Float(&'a mut f64),
    Integer(&'a mut i64),
    Bool(&'a mut bool),
    Text(&'a mut String),
}

impl Slot<'_> {
    fn kind(&self) -> ParamKind {
        match self {
            Slot::Float(_) => ParamKind::Float,
            Slot::Integer(_) => ParamKind::Integer,
            Slot::Bool(_) => ParamKind::Bool,
            Slot::Text(_) => ParamKind::Text,
        }
    }

    fn get(&self) -> ParamValue {
        match self {
            Slot::Float(v) => ParamValue::Float(**v),
            Slot::Integer(v) => ParamValue::Integer(**v),
            Slot::Bool(v) => ParamValue::Bool(**v),
            Slot::Text(v) => ParamValue::Text((*v).clone()),
        }
    }

    /// Returns false and leaves the slot alone if the value has the wrong kind.
    fn store(self, value: ParamValue) -> bool {
        match (self, value) {
            (Slot::Float(slot), ParamValue::Float(v)) => *slot = v,
            (Slot::Integer(slot), ParamValue::Integer(v)) => *slot = v,
            (Slot::Bool(slot), ParamValue::Bool(v)) => *slot = v,
            (Slot::Text(slot), ParamValue::Text(v)) => *slot = v,
            _ => return false,
        }
        true
    }
}

/// One entry of an effect's parameter table.
pub struct Parameter<'a> {
    pub tag: &'static str,
    pub slot: Slot<'a>,
}

impl<'a> Parameter<'a> {
    pub fn float(tag: &'static str, value: &'a mut f64) -> Self {
        Parameter {
            tag,
            slot: Slot::Float(value),
        }
    }

    pub fn integer(tag: &'static str, value: &'a mut i64) -> Self {
        Parameter {
            tag,
            slot: Slot::Integer(value),
        }
    }

    pub fn bool(tag: &'static str, value: &'a mut bool) -> Self {
        Parameter {
            tag,
            slot: Slot::Bool(value),
        }
    }

    pub fn text(tag: &'static str, value: &'a mut String) -> Self {
        Parameter {
            tag,
            slot: Slot::Text(value),
        }
    }
}

/// An animation step. Implementations overwrite or blend over the pixels
/// they are handed and list their externally settable fields in
/// `parameters`; the table must be the same on every call.
pub trait Effect: Send {
    fn parameters(&mut self) -> Vec<Parameter<'_>>;

    fn render(&mut self, pixels: &mut [Pixel]) -> Result<(), String>;
}

/// A named effect behind its own lock. Rendering and parameter access both
/// go through that lock, so a render never sees a half-applied update and
/// updates to different operations never wait on each other.
pub struct Operation {
    name: String,
    effect: Mutex<Box<dyn Effect>>,
}

impl Operation {
    pub fn new(name: &str, effect: impl Effect + 'static) -> Operation {
        Operation {
            name: name.to_string(),
            effect: Mutex::new(Box::new(effect)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    // Effects only hold plain values, so whatever a panicking holder left
    // behind is still usable.
    fn lock(&self) -> MutexGuard<'_, Box<dyn Effect>> {
        self.effect.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn render(&self, pixels: &mut [Pixel]) -> Result<(), RenderError> {
        self.lock()
            .render(pixels)
            .map_err(|reason| RenderError::new(&self.name, reason))
    }

    /// Tags and kinds of every declared parameter, in declaration order.
    pub fn declared(&self) -> Vec<(&'static str, ParamKind)> {
        self.lock()
            .parameters()
            .iter()
            .map(|param| (param.tag, param.slot.kind()))
            .collect()
    }

    pub fn get(&self, tag: &str) -> Option<ParamValue> {
        let mut effect = self.lock();
        let found = effect
            .parameters()
            .into_iter()
            .find(|param| param.tag == tag)
            .map(|param| param.slot.get());
        found
    }

    /// Stores `value` under the operation lock. Returns false if there is no
    /// such tag or the kind does not match.
    pub fn set(&self, tag: &str, value: ParamValue) -> bool {
        let mut effect = self.lock();
        let found = effect.parameters().into_iter().find(|param| param.tag == tag);
        match found {
            Some(param) => param.slot.store(value),
            None => false,
        }
    }
}

/// Operations in render order. Fixed once built.
pub struct Pipeline {
    operations: Vec<Arc<Operation>>,
}

impl Pipeline {
    pub fn new(operations: Vec<Operation>) -> Result<Pipeline, ConfigError> {
        let mut seen = HashSet::new();
        for operation in &operations {
            if !is_valid_segment(operation.name()) {
                return Err(ConfigError::InvalidOperationName(
                    operation.name().to_string(),
                ));
            }
            if !seen.insert(operation.name().to_string()) {
                return Err(ConfigError::DuplicateOperation(
                    operation.name().to_string(),
                ));
            }
        }

        Ok(Pipeline {
            operations: operations.into_iter().map(Arc::new).collect(),
        })
    }

    pub fn operations(&self) -> &[Arc<Operation>] {
        &self.operations
    }

    /// Runs every operation in order. The first failure ends the pass; the
    /// pixels keep whatever the earlier operations wrote.
    pub fn render(&self, pixels: &mut [Pixel]) -> Result<(), RenderError> {
        for operation in &self.operations {
            operation.render(pixels)?;
        }
        Ok(())
    }
}

/// Names end up as MQTT topic levels and OSC address parts.
pub(crate) fn is_valid_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment
            .chars()
            .all(|c| !c.is_whitespace() && !matches!(c, '/' | '+' | '#' | '*' | '?'))
}
