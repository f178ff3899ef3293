use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

pub mod agent;
pub mod builder;
pub mod config;
pub mod engine;
pub mod environment;
pub mod map;
pub mod registry;
pub mod resolver;

/// Unique identifier for agents. Agents are numbered `0..n_agents`.
pub type EntityId = usize;

/// Stable index of an object in the world's object arena.
pub type ObjectId = usize;

/// Represents a 2D coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    pub x: usize,
    pub y: usize,
}

impl Position {
    pub const fn new(x: usize, y: usize) -> Self {
        Position { x, y }
    }
}

/// The fixed color palette objects are drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Color {
    Red,
    Green,
    Blue,
    Purple,
    Yellow,
    Grey,
}

impl Color {
    /// Every color, in palette index order.
    pub const PALETTE: [Color; 6] = [
        Color::Red,
        Color::Green,
        Color::Blue,
        Color::Purple,
        Color::Yellow,
        Color::Grey,
    ];

    /// Position of this color in [`Color::PALETTE`].
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Color> {
        Self::PALETTE.get(index).copied()
    }

    pub fn name(self) -> &'static str {
        match self {
            Color::Red => "red",
            Color::Green => "green",
            Color::Blue => "blue",
            Color::Purple => "purple",
            Color::Yellow => "yellow",
            Color::Grey => "grey",
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown color '{0}', expected one of red, green, blue, purple, yellow, grey")]
pub struct ParseColorError(String);

impl FromStr for Color {
    type Err = ParseColorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        Color::PALETTE
            .into_iter()
            .find(|color| color.name() == lowered)
            .ok_or(ParseColorError(s.to_string()))
    }
}
