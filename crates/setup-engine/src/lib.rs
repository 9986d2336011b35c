//! Setup browser engine.
//!
//! Loads form packages into live form sets, evaluates their opcode
//! expressions on a checkpointed stack machine, keeps question values in
//! sync with edit and committed storage copies, and drives the
//! submit/discard protocol against a configuration provider.
//!
//! The [`Engine`] is the entry point. Everything it talks to outside the
//! process (configuration routing, variables, the clock, permissions,
//! prompts, per-form-set callbacks) sits behind the traits in [`host`].

pub mod config;
pub mod context;
mod defaults;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod expression;
pub mod form;
pub mod gating;
pub mod host;
mod loader;
pub mod ops;
pub mod stack;
pub mod storage;
pub mod strings;
pub mod submit;
pub mod value_sync;

pub use config::{EngineConfig, SubmitScope};
pub use context::{EngineContext, Selection};
pub use engine::{ChangeOutcome, Engine};
pub use error::{BrowserError, BrowserResult, EvalError, EvalResult, HostError, RouteFailure};
pub use evaluator::Evaluator;
pub use form::{Form, FormSet, FormSetHandle, FormSetState, Question};
pub use gating::Gating;
pub use host::{
    AccessControl, CallbackAction, CallbackResponse, ConfigRouting, DefaultSource, DefaultTable,
    FixedChoice, FormCallback, Host, MemoryRouting, MemoryVariables, PermissionSet, ProviderData,
    SaveFailedChoice, UserPrompt, VariableService,
};
pub use storage::{BufferCopy, SyncDirection};
pub use submit::{SaveFailure, SubmitStatus};
pub use value_sync::ValueSource;
