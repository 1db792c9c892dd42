//! Data layer: frame types, dataset writing and loading.
//!
//! Architecture:
//! ```text
//!   Frame (24 x 32)
//!        │
//!        ▼
//!   ┌──────────┐
//!   │  writer   │  FrameSink → one CSV row per frame, header p0..p767
//!   └──────────┘
//!        │
//!        ▼
//!   flame.csv / noflame.csv
//!        │
//!        ▼
//!   ┌──────────┐
//!   │  loader   │  parse file → Dataset (shape-checked)
//!   └──────────┘
//! ```

pub mod loader;
pub mod model;
pub mod writer;
