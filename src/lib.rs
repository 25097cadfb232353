pub mod config;
pub mod scene;
pub mod script_watch;
pub mod scripting;

pub use scene::{EntityId, Scene, ScriptBehaviour};
pub use scripting::{ExecutionMode, ScriptEngine};
