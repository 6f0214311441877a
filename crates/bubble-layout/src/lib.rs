//! Bubble Network Layout
//!
//! Frame-driven force-directed layout for the network view.
//!
//! # Architecture
//!
//! - **Simulation**: advances one tick per animation frame and emits a full
//!   position map until alpha cools below its threshold
//! - **Forces**: many-body repulsion (Barnes–Hut above a size threshold),
//!   link springs, collision, centering
//! - **Layers**: prominence buckets that cap how many entities are simulated
//!   at once; idle layers sit at deterministic positions
//!
//! # Usage
//!
//! ```ignore
//! let mut sim = Simulation::with_graph(SimulationConfig::default(), nodes, links);
//! while let Some(frame) = sim.tick() {
//!     render(&frame.positions);
//! }
//! ```

mod config;
mod error;
mod forces;
mod graph;
mod layers;
mod octree;
mod simulation;

pub use config::{Dimensions, ForceConfig, SimulationConfig};
pub use error::{Error, Result};
pub use graph::{EntityId, LayoutNode, Link, Position, TickFrame};
pub use layers::{Layer, LayerConfig, LayerStyle, Layers};
pub use simulation::Simulation;
