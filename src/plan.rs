//! Pipeline compiler.
//!
//! Turns a [`Configuration`] into a reusable [`CompiledPipeline`] once, then
//! runs it against any number of inputs.
//!
//! Compilation is two-phase. Each configured key is looked up in a
//! registration table and parsed into a typed [`Step`]:
//!
//! - [`Step::Static`]: an [`Operation`] that is the same for every file.
//! - [`Step::Scale`]: a resize whose width is a fraction of the source width,
//!   so it can only be resolved once a file's [`Metadata`] is known.
//!
//! At run time the plan is [resolved](Plan::resolve) against the probed
//! metadata into a flat list of operations, which is then folded over the
//! backend handle in order. The metadata probe is skipped when the plan has
//! no metadata-dependent steps.
//!
//! Unknown keys are skipped with a warning so configurations can carry keys
//! meant for other tools.

use crate::config::{Args, ConfigError, Configuration, Output};
use crate::imaging::{
    BackendError, ImageBackend, Input, Metadata, OpenOptions, Operation, Region, ResizeOptions,
    calculate_scaled_width,
};
use serde_json::Value;
use tracing::{debug, warn};

/// One entry of a compiled plan.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    Static(Operation),
    /// Resize to `source_width * factor`, height following aspect ratio.
    Scale { factor: f64, options: ResizeOptions },
}

/// Ordered steps compiled from a configuration. Immutable once built.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Plan {
    steps: Vec<Step>,
}

impl Plan {
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Whether running this plan needs the source image's metadata.
    pub fn needs_metadata(&self) -> bool {
        self.steps.iter().any(|s| matches!(s, Step::Scale { .. }))
    }

    /// Rewrite metadata-dependent steps into concrete operations.
    ///
    /// `metadata` may only be `None` when [`needs_metadata`](Self::needs_metadata) is false.
    pub fn resolve(&self, metadata: Option<&Metadata>) -> Vec<Operation> {
        self.steps
            .iter()
            .filter_map(|step| match step {
                Step::Static(op) => Some(op.clone()),
                Step::Scale { factor, options } => metadata.map(|m| Operation::Resize {
                    width: Some(calculate_scaled_width(m.width, *factor)),
                    height: None,
                    options: *options,
                }),
            })
            .collect()
    }
}

type Parser = fn(&Args) -> Result<Option<Step>, String>;

/// Configuration keys the compiler understands, in no particular order.
const REGISTRY: &[(&str, Parser)] = &[
    ("resize", parse_resize),
    ("extract", parse_extract),
    ("scale", parse_scale),
    ("rotate", parse_rotate),
    ("flip", parse_flip),
    ("flop", parse_flop),
    ("greyscale", parse_greyscale),
    ("grayscale", parse_greyscale),
    ("negate", parse_negate),
    ("blur", parse_blur),
    ("sharpen", parse_sharpen),
];

fn lookup(name: &str) -> Option<Parser> {
    REGISTRY
        .iter()
        .find(|(key, _)| *key == name)
        .map(|(_, parser)| *parser)
}

fn dimension(value: &Value) -> Result<Option<u32>, String> {
    match value {
        Value::Null => Ok(None),
        Value::Number(n) => n
            .as_u64()
            .filter(|&v| v > 0 && v <= u32::MAX as u64)
            .map(|v| Some(v as u32))
            .ok_or_else(|| format!("dimension must be a positive integer, got {n}")),
        other => Err(format!("dimension must be a number or null, got {other}")),
    }
}

fn resize_options(value: Option<&Value>) -> Result<ResizeOptions, String> {
    match value {
        None | Some(Value::Null) => Ok(ResizeOptions::default()),
        Some(v) => serde_json::from_value(v.clone()).map_err(|e| e.to_string()),
    }
}

fn parse_resize(args: &Args) -> Result<Option<Step>, String> {
    let Args::Positional(items) = args else {
        return Err("expected [width, height?, options?]".to_string());
    };
    if items.len() > 3 {
        return Err(format!("expected at most 3 arguments, got {}", items.len()));
    }
    let width = items.first().map(dimension).transpose()?.flatten();
    let height = items.get(1).map(dimension).transpose()?.flatten();
    let options = resize_options(items.get(2))?;
    Ok(Some(Step::Static(Operation::Resize {
        width,
        height,
        options,
    })))
}

fn parse_extract(args: &Args) -> Result<Option<Step>, String> {
    let value = match args {
        Args::Single(v) => v,
        Args::Positional(items) if items.len() == 1 => &items[0],
        Args::Positional(_) => return Err("expected { left, top, width, height }".to_string()),
    };
    let region: Region = serde_json::from_value(value.clone()).map_err(|e| e.to_string())?;
    Ok(Some(Step::Static(Operation::Extract(region))))
}

fn parse_scale(args: &Args) -> Result<Option<Step>, String> {
    let (factor, options) = match args {
        Args::Single(v) => (v, None),
        Args::Positional(items) if (1..=2).contains(&items.len()) => (&items[0], items.get(1)),
        Args::Positional(_) => return Err("expected [factor, options?]".to_string()),
    };
    let factor = factor
        .as_f64()
        .filter(|f| f.is_finite() && *f > 0.0)
        .ok_or_else(|| format!("factor must be a positive number, got {factor}"))?;
    Ok(Some(Step::Scale {
        factor,
        options: resize_options(options)?,
    }))
}

fn angle(value: &Value) -> Result<i32, String> {
    value
        .as_f64()
        .filter(|a| a.fract() == 0.0 && a.abs() <= i32::MAX as f64)
        .map(|a| a as i32)
        .ok_or_else(|| format!("angle must be a whole number of degrees, got {value}"))
}

/// `false` omits the step, `true` auto-orients, a number rotates by that many
/// degrees. `[angle, options]` uses the angle; right-angle rotations need no fill.
fn parse_rotate(args: &Args) -> Result<Option<Step>, String> {
    let rotation = match args {
        Args::Single(Value::Bool(false)) => return Ok(None),
        Args::Single(Value::Bool(true)) => None,
        Args::Single(v) => Some(angle(v)?),
        Args::Positional(items) if (1..=2).contains(&items.len()) => Some(angle(&items[0])?),
        Args::Positional(_) => return Err("expected [angle, options?]".to_string()),
    };
    Ok(Some(Step::Static(Operation::Rotate(rotation))))
}

fn parse_flag(args: &Args, op: Operation) -> Result<Option<Step>, String> {
    match args {
        Args::Single(Value::Bool(true)) => Ok(Some(Step::Static(op))),
        Args::Single(Value::Bool(false)) => Ok(None),
        _ => Err("expected true or false".to_string()),
    }
}

fn parse_flip(args: &Args) -> Result<Option<Step>, String> {
    parse_flag(args, Operation::Flip)
}

fn parse_flop(args: &Args) -> Result<Option<Step>, String> {
    parse_flag(args, Operation::Flop)
}

fn parse_greyscale(args: &Args) -> Result<Option<Step>, String> {
    parse_flag(args, Operation::Greyscale)
}

fn parse_negate(args: &Args) -> Result<Option<Step>, String> {
    parse_flag(args, Operation::Negate)
}

fn parse_blur(args: &Args) -> Result<Option<Step>, String> {
    Ok(parse_sigma(args)?.map(|s| Step::Static(Operation::Blur(s))))
}

fn parse_sharpen(args: &Args) -> Result<Option<Step>, String> {
    Ok(parse_sigma(args)?.map(|s| Step::Static(Operation::Sharpen(s))))
}

/// `true` uses sigma 1.0, `false` omits the step, a number is the sigma.
fn parse_sigma(args: &Args) -> Result<Option<f32>, String> {
    match args {
        Args::Single(Value::Bool(true)) => Ok(Some(1.0)),
        Args::Single(Value::Bool(false)) => Ok(None),
        Args::Single(v) => v
            .as_f64()
            .filter(|s| (0.3..=1000.0).contains(s))
            .map(|s| Some(s as f32))
            .ok_or_else(|| format!("sigma must be between 0.3 and 1000, got {v}")),
        Args::Positional(_) => Err("expected a sigma or true/false".to_string()),
    }
}

/// A configuration compiled into a plan plus its output conversion.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledPipeline {
    plan: Plan,
    output: Option<Output>,
}

impl CompiledPipeline {
    pub fn compile(config: &Configuration) -> Result<Self, ConfigError> {
        let mut steps = Vec::with_capacity(config.entries().len());
        for (name, args) in config.entries() {
            let Some(parser) = lookup(name) else {
                warn!(operation = %name, "no image operation named '{name}', skipping");
                continue;
            };
            let step = parser(args).map_err(|reason| ConfigError::InvalidArgument {
                key: name.clone(),
                reason,
            })?;
            steps.extend(step);
        }
        debug!(steps = steps.len(), "compiled pipeline");
        Ok(Self {
            plan: Plan { steps },
            output: config.output().cloned(),
        })
    }

    pub fn plan(&self) -> &Plan {
        &self.plan
    }

    pub fn output(&self) -> Option<&Output> {
        self.output.as_ref()
    }

    /// Run the pipeline over one input and return the encoded bytes.
    ///
    /// Backend errors are returned unaltered.
    pub fn run<B: ImageBackend>(&self, backend: &B, input: Input) -> Result<Vec<u8>, BackendError> {
        let handle = backend.open(
            input,
            OpenOptions {
                sequential_read: true,
            },
        )?;

        let metadata = if self.plan.needs_metadata() {
            Some(backend.metadata(&handle)?)
        } else {
            None
        };

        let handle = self
            .plan
            .resolve(metadata.as_ref())
            .iter()
            .try_fold(handle, |acc, op| backend.apply(acc, op))?;

        let handle = match &self.output {
            Some(output) => backend.convert(handle, output.format)?,
            None => handle,
        };

        backend.to_buffer(handle)
    }
}
