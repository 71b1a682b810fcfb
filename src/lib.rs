//! protomut core library: schema model, structure-aware mutation engine, and
//! fuzzing-engine glue shared by the CLI and harnesses.

#[path = "runtime/budget.rs"]
mod budget;
#[path = "cmd/codec.rs"]
mod codec;
#[path = "platform/config.rs"]
mod config;
#[path = "modes/container.rs"]
mod container;
#[path = "modes/crossover.rs"]
mod crossover;
#[path = "runtime/engine.rs"]
mod engine;
#[path = "platform/error.rs"]
mod error;
#[path = "cmd/harness.rs"]
mod harness;
#[path = "modes/initializer.rs"]
mod initializer;
#[path = "model/message.rs"]
mod message;
#[path = "modes/policy.rs"]
mod policy;
#[path = "runtime/random.rs"]
mod random;
#[path = "model/records.rs"]
mod records;
#[path = "model/schema.rs"]
mod schema;
#[path = "model/schema_doc.rs"]
mod schema_doc;
#[path = "modes/walker.rs"]
mod walker;

pub use budget::*;
pub use codec::*;
pub use config::*;
pub use engine::*;
pub use error::*;
pub use harness::*;
pub use initializer::initialize_message;
pub use message::*;
pub use policy::*;
pub use random::*;
pub use records::*;
pub use schema::*;
pub use schema_doc::*;
