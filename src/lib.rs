//---------------------------------------
pub mod calendar;
pub mod habits;
pub mod world;
//---------------------------------------

//---------------------------------------
pub mod persist;
pub mod settings;
//---------------------------------------

//---------------------------------------
pub mod api;
pub mod error;
pub mod routes;
pub mod state;

pub use routes::map_routes;
pub use state::{AppState, SharedState};
//---------------------------------------
