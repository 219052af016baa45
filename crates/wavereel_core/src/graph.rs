//! Typed representation of an ffmpeg `-filter_complex` graph.
//!
//! A graph is an ordered list of stages. Each stage reads numbered engine
//! inputs (`[0:v]`, `[1:a]`) or labels produced by earlier stages, runs a
//! comma-separated filter chain and binds its results to new labels. The
//! textual form is only produced at the boundary via [`FilterGraph::render`].

use std::fmt;

use crate::error::{CoreError, Result};

// ---------------------------------------------------------------------------
// Pads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Video,
    Audio,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pad {
    /// A stream of a numbered engine input.
    Input { index: usize, stream: StreamKind },
    /// A label produced by an earlier stage.
    Link(String),
}

impl Pad {
    pub fn video(index: usize) -> Self {
        Pad::Input {
            index,
            stream: StreamKind::Video,
        }
    }

    pub fn audio(index: usize) -> Self {
        Pad::Input {
            index,
            stream: StreamKind::Audio,
        }
    }

    pub fn link(name: impl Into<String>) -> Self {
        Pad::Link(name.into())
    }
}

impl fmt::Display for Pad {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pad::Input { index, stream } => {
                let s = match stream {
                    StreamKind::Video => "v",
                    StreamKind::Audio => "a",
                };
                write!(f, "[{index}:{s}]")
            }
            Pad::Link(name) => write!(f, "[{name}]"),
        }
    }
}

// ---------------------------------------------------------------------------
// Filter
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub name: String,
    pub args: Vec<(Option<String>, String)>,
}

impl Filter {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
        }
    }

    /// Append a positional argument.
    pub fn arg(mut self, value: impl fmt::Display) -> Self {
        self.args.push((None, value.to_string()));
        self
    }

    /// Append a `key=value` argument.
    pub fn kv(mut self, key: impl Into<String>, value: impl fmt::Display) -> Self {
        self.args.push((Some(key.into()), value.to_string()));
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.args
            .iter()
            .find(|(k, _)| k.as_deref() == Some(key))
            .map(|(_, v)| v.as_str())
    }
}

/// Quote values that would otherwise split the argument list or the chain.
fn escape_value(value: &str) -> String {
    if value.contains([':', ',', ';', '[', ']', '\'']) {
        format!("'{}'", value.replace('\'', "'\\''"))
    } else {
        value.to_string()
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        for (i, (key, value)) in self.args.iter().enumerate() {
            f.write_str(if i == 0 { "=" } else { ":" })?;
            if let Some(key) = key {
                write!(f, "{key}=")?;
            }
            f.write_str(&escape_value(value))?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Stage
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Stage {
    pub inputs: Vec<Pad>,
    pub chain: Vec<Filter>,
    pub outputs: Vec<String>,
}

impl Stage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn input(mut self, pad: Pad) -> Self {
        self.inputs.push(pad);
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.chain.push(filter);
        self
    }

    pub fn output(mut self, label: impl Into<String>) -> Self {
        self.outputs.push(label.into());
        self
    }

    pub fn has_filter(&self, name: &str) -> bool {
        self.chain.iter().any(|f| f.name == name)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for pad in &self.inputs {
            write!(f, "{pad}")?;
        }
        for (i, filter) in self.chain.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{filter}")?;
        }
        for label in &self.outputs {
            write!(f, "[{label}]")?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FilterGraph
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterGraph {
    stages: Vec<Stage>,
}

impl FilterGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, stage: Stage) {
        self.stages.push(stage);
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Number of stages whose chain contains the named filter.
    pub fn count_filter(&self, name: &str) -> usize {
        self.stages.iter().filter(|s| s.has_filter(name)).count()
    }

    /// The `;`-joined wire format passed to `-filter_complex`.
    pub fn render(&self) -> String {
        self.stages
            .iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>()
            .join(";")
    }

    /// Check label resolution.
    ///
    /// Every consumed label must be open (produced earlier and not yet
    /// consumed), every numbered input must be below `input_count`, no
    /// label may be produced while an earlier binding of it is still open,
    /// and at the end exactly `final_output` remains open.
    pub fn validate(&self, input_count: usize, final_output: &str) -> Result<()> {
        let mut open: Vec<&str> = Vec::new();

        for stage in &self.stages {
            for pad in &stage.inputs {
                match pad {
                    Pad::Input { index, .. } => {
                        if *index >= input_count {
                            return Err(CoreError::InputOutOfRange {
                                index: *index,
                                count: input_count,
                            });
                        }
                    }
                    Pad::Link(name) => match open.iter().position(|l| *l == name.as_str()) {
                        Some(pos) => {
                            open.remove(pos);
                        }
                        None => return Err(CoreError::UnresolvedLabel(name.clone())),
                    },
                }
            }

            for label in &stage.outputs {
                if open.contains(&label.as_str()) {
                    return Err(CoreError::DuplicateLabel(label.clone()));
                }
                open.push(label.as_str());
            }
        }

        match open.iter().position(|l| *l == final_output) {
            Some(pos) => {
                open.remove(pos);
            }
            None => return Err(CoreError::MissingOutput(final_output.to_string())),
        }

        match open.first() {
            Some(dangling) => Err(CoreError::DanglingLabel(dangling.to_string())),
            None => Ok(()),
        }
    }
}

impl fmt::Display for FilterGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
