// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

pub mod chat;
pub mod filter;
pub mod ids;
pub mod model;
pub mod panel;
pub mod selection;
pub mod state;

pub use chat::*;
pub use filter::*;
pub use ids::*;
pub use model::*;
pub use panel::*;
pub use selection::*;
pub use state::*;
