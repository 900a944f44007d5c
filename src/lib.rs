//! Live dashboard for a port-scanning backend: a resilient results client, the
//! scan data store, and an egui attack-graph view with a force-directed layout.

pub mod app;
pub mod live;
pub mod scan;
mod util;
