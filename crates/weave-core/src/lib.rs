#![doc = r"Keyed template reconciliation engine: render units, slots, unit pools and the list reconciler."]

pub mod collections;
pub mod config;
pub mod error;
pub mod hash;
pub mod key;
pub mod platform;
pub mod pool;
pub mod reconcile;
pub mod renderer;
pub mod skeleton;
pub mod slot;
pub mod tree;
pub mod unit;
pub mod value;

pub use config::RenderConfig;
pub use error::{report_pool_violation, NodeError, RenderError, SkeletonError};
pub use key::{KeyHasher, UnitKey, UnitKeys, TEXT_CLOSE_KEY};
pub use platform::{Host, NoopHost};
pub use pool::UnitPool;
pub use reconcile::{reconcile, ReconcileStats, Region};
pub use renderer::Renderer;
pub use skeleton::{
    capability_for, get_skeleton, Capability, Skeleton, SkeletonBuilder, SkeletonCache, SkeletonId,
    SlotDescriptor, SlotKind, StaticNode, TemplateCompiler, CLOSE_MARKER, OPEN_MARKER,
};
pub use slot::Child;
pub use tree::{Mutation, MutationStats, NodeId, NodeKind, PropValue, Tree};
pub use unit::{SlotRef, UnitId};
pub use value::{Callback, EvalScope, Event, Template, Thunk, Value};
