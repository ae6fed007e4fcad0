use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::Error;

/// Chunk size tier requested by a caller.
///
/// `Adaptive` lets the retriever pick the stored tier per query and attaches neighboring
/// chunks as expanded context.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
	#[default]
	Coarse,
	Fine,
	Adaptive,
}
impl Granularity {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Coarse => "coarse",
			Self::Fine => "fine",
			Self::Adaptive => "adaptive",
		}
	}
}
impl fmt::Display for Granularity {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}
impl FromStr for Granularity {
	type Err = Error;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.trim().to_lowercase().as_str() {
			"coarse" => Ok(Self::Coarse),
			"fine" => Ok(Self::Fine),
			"adaptive" => Ok(Self::Adaptive),
			other => Err(Error::UnknownGranularity { name: other.to_string() }),
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryType {
	Factual,
	Analytical,
}
impl QueryType {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Factual => "factual",
			Self::Analytical => "analytical",
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
	Easy,
	Medium,
	Hard,
}
impl Difficulty {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Easy => "easy",
			Self::Medium => "medium",
			Self::Hard => "hard",
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryIntent {
	Factual,
	Procedural,
	Analytical,
	Comparative,
	Creative,
	Troubleshooting,
}
impl QueryIntent {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Factual => "factual",
			Self::Procedural => "procedural",
			Self::Analytical => "analytical",
			Self::Comparative => "comparative",
			Self::Creative => "creative",
			Self::Troubleshooting => "troubleshooting",
		}
	}
}
