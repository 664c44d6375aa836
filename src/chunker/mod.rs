//! Budget-bounded chunking of log units.
//!
//! Units are packed greedily in bundle order so that related lines stay
//! adjacent. A unit that alone exceeds the budget is split at line
//! boundaries into partial members, each emitted as its own chunk.

pub mod size;

pub use size::SizeUnit;

use crate::error::ChunkBudgetError;
use crate::models::{Chunk, ChunkMember, LogUnit, PartInfo};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// How to handle a unit larger than the budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SplitPolicy {
    /// Split between lines; a single line over budget becomes its own part
    #[default]
    Lines,
    /// Keep the unit whole as one over-budget chunk
    Whole,
}

/// Chunking parameters.
#[derive(Debug, Clone)]
pub struct ChunkerConfig {
    /// Maximum size per chunk, in `size_unit`.
    pub budget: usize,
    /// Maximum number of chunks a bundle may produce.
    pub max_chunks: usize,
    pub size_unit: SizeUnit,
    pub split_policy: SplitPolicy,
}

impl From<&crate::config::ChunkingConfig> for ChunkerConfig {
    fn from(config: &crate::config::ChunkingConfig) -> Self {
        Self {
            budget: config.budget,
            max_chunks: config.max_chunks,
            size_unit: config.size_unit,
            split_policy: config.split_policy,
        }
    }
}

/// Partitions log units into chunks.
pub struct Chunker {
    config: ChunkerConfig,
}

impl Chunker {
    pub fn new(config: ChunkerConfig) -> Self {
        Self { config }
    }

    /// Partition `units` into chunks covering every unit exactly once.
    ///
    /// # Errors
    ///
    /// Returns [`ChunkBudgetError::ChunkCountExceedsCeiling`] if more than
    /// `max_chunks` chunks would be needed.
    pub fn chunk(&self, units: &[LogUnit]) -> Result<Vec<Chunk>, ChunkBudgetError> {
        let mut packer = Packer {
            config: &self.config,
            chunks: Vec::new(),
            current: ChunkBuilder::default(),
        };

        for unit in units {
            packer.add_unit(unit)?;
        }
        packer.flush()?;

        let chunks = packer.chunks;
        self.log_results(units.len(), &chunks);
        Ok(chunks)
    }

    fn log_results(&self, unit_count: usize, chunks: &[Chunk]) {
        let over_budget = chunks
            .iter()
            .filter(|c| c.approx_size > self.config.budget)
            .count();

        info!(
            "Packed {} units into {} chunks (budget {} {:?}, {} over budget)",
            unit_count,
            chunks.len(),
            self.config.budget,
            self.config.size_unit,
            over_budget
        );

        for chunk in chunks {
            debug!(
                "Chunk {}: {} members, size {}",
                chunk.chunk_id,
                chunk.members.len(),
                chunk.approx_size
            );
        }
    }
}

struct Packer<'a> {
    config: &'a ChunkerConfig,
    chunks: Vec<Chunk>,
    current: ChunkBuilder,
}

impl Packer<'_> {
    fn add_unit(&mut self, unit: &LogUnit) -> Result<(), ChunkBudgetError> {
        let size = self.config.size_unit.measure(&unit.raw_text);

        if size <= self.config.budget {
            if !self.current.can_fit(size, self.config.budget) {
                self.flush()?;
            }
            self.current.push(unit, &unit.raw_text, size, None);
            return Ok(());
        }

        debug!(
            "Unit #{} '{}' exceeds budget ({} > {}), splitting",
            unit.ordinal, unit.source_id, size, self.config.budget
        );

        self.flush()?;

        let parts = match self.config.split_policy {
            SplitPolicy::Lines => split_at_lines(&unit.raw_text, self.config),
            SplitPolicy::Whole => vec![(unit.raw_text.as_str(), size)],
        };

        if parts.len() == 1 {
            self.current.push(unit, &unit.raw_text, size, None);
            return self.flush();
        }

        let total = parts.len();
        for (index, (text, part_size)) in parts.into_iter().enumerate() {
            self.current
                .push(unit, text, part_size, Some(PartInfo { index, total }));
            self.flush()?;
        }

        Ok(())
    }

    /// Close the current chunk, if it has members.
    fn flush(&mut self) -> Result<(), ChunkBudgetError> {
        let builder = std::mem::take(&mut self.current);
        if builder.members.is_empty() {
            return Ok(());
        }

        if self.chunks.len() >= self.config.max_chunks {
            return Err(ChunkBudgetError::ChunkCountExceedsCeiling {
                ceiling: self.config.max_chunks,
                budget: self.config.budget,
            });
        }

        self.chunks.push(builder.build(self.chunks.len()));
        Ok(())
    }
}

#[derive(Default)]
struct ChunkBuilder {
    text: String,
    members: Vec<ChunkMember>,
    size: usize,
}

impl ChunkBuilder {
    fn can_fit(&self, size: usize, budget: usize) -> bool {
        self.size + size <= budget
    }

    fn push(&mut self, unit: &LogUnit, text: &str, size: usize, part: Option<PartInfo>) {
        let start = self.text.len();
        self.text.push_str(text);
        self.members.push(ChunkMember {
            source_id: unit.source_id.clone(),
            source_kind: unit.source_kind,
            start,
            end: self.text.len(),
            part,
        });
        self.size += size;
    }

    fn build(self, chunk_id: usize) -> Chunk {
        Chunk {
            chunk_id,
            members: self.members,
            text: self.text,
            approx_size: self.size,
        }
    }
}

/// Split `text` into line-aligned parts that each fit the budget.
///
/// Lines keep their terminators so the parts concatenate back to `text`.
/// A single line longer than the budget becomes a part of its own.
fn split_at_lines<'t>(text: &'t str, config: &ChunkerConfig) -> Vec<(&'t str, usize)> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut end = 0;
    let mut size = 0;

    for line in text.split_inclusive('\n') {
        let line_size = config.size_unit.measure(line);
        if end > start && size + line_size > config.budget {
            parts.push((&text[start..end], size));
            start = end;
            size = 0;
        }
        end += line.len();
        size += line_size;
    }

    if end > start {
        parts.push((&text[start..end], size));
    }

    parts
}
