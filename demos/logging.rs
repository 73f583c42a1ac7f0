//! Shows the tracing output emitted by container operations.
//!
//! Run with: cargo run --example logging --features logging-pretty

use std::sync::Arc;
use trellis_di::{Container, Provider, logging};

struct Clock;

#[allow(dead_code)]
struct Reporter {
    clock: Arc<Clock>,
}

fn main() -> trellis_di::Result<()> {
    // TRACE shows every resolve step; DEBUG only registrations and disposal.
    logging::builder().trace().pretty().container_only().init();

    let container = Container::new();
    container.register("clock", Provider::new(|_| Ok(Clock)))?;
    container.register(
        "reporter",
        Provider::new(|args| {
            Ok(Reporter {
                clock: args.required::<Clock>()?,
            })
        })
        .with_deps(["clock"]),
    )?;

    let _reporter = container.get_as::<Reporter>("reporter")?;

    let child = container.create()?;
    let _again = child.get("reporter")?;

    container.dispose()?;
    Ok(())
}
