//! End-to-end walkthrough: values, lifecycles, a factory, and disposal.
//!
//! Run with: cargo run --example basic

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use trellis_di::{Factory, Lifecycle, Options, Provider, create_with};

static JOB_IDS: AtomicU32 = AtomicU32::new(1);

struct Config {
    dsn: &'static str,
}

struct Pool {
    config: Arc<Config>,
}

struct Job {
    pool: Arc<Pool>,
    id: u32,
}

struct Scheduler {
    jobs: Arc<Factory>,
}

fn main() -> trellis_di::Result<()> {
    let container = create_with(Options::new().on_dispose(|_instance, name| {
        println!("releasing {name}");
        Ok(())
    }));

    container.register_value("config", Config { dsn: "postgres://localhost" })?;

    container.register_with(
        "pool",
        Provider::new(|args| {
            Ok(Pool {
                config: args.required::<Config>()?,
            })
        })
        .with_deps(["config"]),
        Lifecycle::Singleton,
    )?;

    container.register_with(
        "job",
        Provider::new(|args| {
            Ok(Job {
                pool: args.required::<Pool>()?,
                id: JOB_IDS.fetch_add(1, Ordering::SeqCst),
            })
        })
        .with_deps(["pool"]),
        Lifecycle::Unique,
    )?;

    container.register(
        "scheduler",
        Provider::new(|args| {
            Ok(Scheduler {
                jobs: args.factory()?,
            })
        })
        .with_deps(["job!"]),
    )?;

    let scheduler = container.get_as::<Scheduler>("scheduler")?;

    let first = scheduler.jobs.get_as::<Job>()?;
    let second = scheduler.jobs.get_as::<Job>()?;
    println!(
        "jobs {} and {} share the pool at {}",
        first.id, second.id, second.pool.config.dsn
    );

    // Disposing the container releases both jobs before the scheduler.
    container.dispose()?;
    Ok(())
}
