//! Setup routines run once at process startup: logging, the database
//! connection/schema, and launching the Rocket servers.

pub mod launch_server;
pub mod setup_database;
pub mod setup_logging;

pub use launch_server::launch_server;
pub use setup_database::setup_database;
pub use setup_logging::setup_logging;
