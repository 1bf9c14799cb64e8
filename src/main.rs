//! Demo harness for the task-graph scheduler: builds one of a handful of
//! example DAGs and runs it to completion, printing the result or the
//! structured error.

use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tg_dag::{Thunk, ThunkContext, ThunkFn, ThunkInput, ThunkOptions, ThunkValue};
use tg_proc::{ProcList, ProcessProcessor, Processor, ProcessorKind};
use tg_sched::{Scheduler, SchedulerConfig};

#[derive(Parser)]
#[command(name = "tg-scheduler", about = "Run an example task graph through the scheduler")]
struct Opt {
    #[command(subcommand)]
    scenario: Scenario,

    /// Worker threads in the default processor pool.
    #[arg(long, global = true)]
    threads: Option<usize>,
}

#[derive(Subcommand)]
enum Scenario {
    /// A -> B -> C, each adding/doubling the previous result.
    Linear,
    /// A feeds both B and C, which feed D.
    Diamond,
    /// A fails; B and C depend on it transitively.
    Failure,
    /// The root adds a thunk to the DAG while it runs, then fetches it.
    DynamicAdd,
    /// The root requests a halt instead of finishing normally.
    Halt,
    /// A thunk is restricted to a processor kind the pool doesn't have.
    Exhausted,
    /// A thunk is pinned to one specific thread processor, looked up by id.
    Pinned,
}

fn value(v: i64) -> ThunkFn {
    Arc::new(move |_ctx: &dyn ThunkContext, _args: &[ThunkValue]| Ok(ThunkValue::new(v)))
}

fn add(delta: i64) -> ThunkFn {
    Arc::new(move |_ctx: &dyn ThunkContext, args: &[ThunkValue]| {
        Ok(ThunkValue::new(args[0].downcast_ref::<i64>().unwrap() + delta))
    })
}

fn run(config: SchedulerConfig, scenario: Scenario) -> Result<i64> {
    let scheduler = Scheduler::new(vec![ProcessProcessor::new(config.thread_count) as Arc<dyn Processor>]);

    let root = match scenario {
        Scenario::Linear => {
            let a = scheduler.submit(Thunk::with_options(
                value(1),
                vec![],
                ThunkOptions::new().description("seed"),
            ))?;
            let b = scheduler.submit(Thunk::new(add(1), vec![ThunkInput::Thunk(a)]))?;
            scheduler.submit(Thunk::with_options(
                Arc::new(|_ctx: &dyn ThunkContext, args: &[ThunkValue]| {
                    Ok(ThunkValue::new(args[0].downcast_ref::<i64>().unwrap() * 2))
                }),
                vec![ThunkInput::Thunk(b)],
                ThunkOptions::new().description("double"),
            ))?
        }
        Scenario::Diamond => {
            let a = scheduler.submit(Thunk::new(value(10), vec![]))?;
            let b = scheduler.submit(Thunk::new(add(1), vec![ThunkInput::Thunk(a)]))?;
            let c = scheduler.submit(Thunk::new(add(2), vec![ThunkInput::Thunk(a)]))?;
            scheduler.submit(Thunk::new(
                Arc::new(|_ctx: &dyn ThunkContext, args: &[ThunkValue]| {
                    Ok(ThunkValue::new(
                        args[0].downcast_ref::<i64>().unwrap() * args[1].downcast_ref::<i64>().unwrap(),
                    ))
                }),
                vec![ThunkInput::Thunk(b), ThunkInput::Thunk(c)],
            ))?
        }
        Scenario::Failure => {
            let a = scheduler.submit(Thunk::new(
                Arc::new(|_ctx: &dyn ThunkContext, _args: &[ThunkValue]| anyhow::bail!("synthetic failure")),
                vec![],
            ))?;
            let b = scheduler.submit(Thunk::new(add(1), vec![ThunkInput::Thunk(a)]))?;
            scheduler.submit(Thunk::new(add(1), vec![ThunkInput::Thunk(b)]))?
        }
        Scenario::DynamicAdd => scheduler.submit(Thunk::new(
            Arc::new(|ctx: &dyn ThunkContext, _args: &[ThunkValue]| {
                let child = ctx.add_thunk(value(7), vec![], ThunkOptions::new())?;
                ctx.fetch(child)
            }),
            vec![],
        ))?,
        Scenario::Halt => scheduler.submit(Thunk::new(
            Arc::new(|ctx: &dyn ThunkContext, _args: &[ThunkValue]| {
                ctx.halt()?;
                Ok(ThunkValue::new(0i64))
            }),
            vec![],
        ))?,
        Scenario::Exhausted => {
            let opts = ThunkOptions::new().proclist(ProcList::Kinds(vec![ProcessorKind::new("gpu")]));
            scheduler.submit(Thunk::with_options(value(1), vec![], opts))?
        }
        Scenario::Pinned => {
            let threads = scheduler.processors().procs()[0].get_processors();
            let target = threads[0].id();
            anyhow::ensure!(
                scheduler.find_processor(target).is_some(),
                "pinned processor {target} vanished from the registry"
            );
            let opts = ThunkOptions::new().single(target).description("pinned");
            scheduler.submit(Thunk::with_options(value(9), vec![], opts))?
        }
    };

    let result = scheduler.compute(root)?;
    if let Some(status) = scheduler.status(root) {
        if let (Some(start), Some(end)) = (status.dispatched_at, status.finished_at) {
            if let Ok(elapsed) = end.duration_since(start) {
                log::info!("root thunk \"{}\" finished in {elapsed:?}", status.description);
            }
        }
    }
    Ok(*result.downcast_ref::<i64>().unwrap_or(&0))
}

fn main() -> Result<()> {
    env_logger::init();
    let opt = Opt::parse();
    let config = SchedulerConfig::new(opt.threads.unwrap_or_else(num_cpus::get));

    match run(config, opt.scenario) {
        Ok(value) => println!("{value}"),
        Err(e) => {
            eprintln!("scheduler error: {e:#}");
            std::process::exit(1);
        }
    }
    Ok(())
}
