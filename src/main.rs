use std::sync::Arc;

use clap::Parser;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use codejudge::config::{CliArgs, Config};
use codejudge::database::{self as db, SqliteStore};
use codejudge::orchestrator::Orchestrator;
use codejudge::queue::JobQueue;
use codejudge::sandbox::create_runner;
use codejudge::web_server::build_server;
use codejudge::worker::worker;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let cli = CliArgs::parse();
    let n_threads = cli.threads;

    if n_threads == 0 {
        panic!("The number of worker threads must not be 0");
    }

    let Config {
        server: server_config,
        judge: judge_config,
        database_path,
    } = cli.to_config().expect("Failed to load configuration");

    let db_path = database_path.unwrap_or_else(db::get_db_path);
    if cli.flush_data {
        db::remove_db(&db_path);
    }

    let store = SqliteStore::open(&db_path)
        .await
        .expect("Failed to initialize database");

    log::info!(
        "Time limit: {} ms, memory limit: {} MB (not enforced)",
        judge_config.time_limit.0,
        judge_config.memory_limit.0
    );
    if !judge_config.execution_enabled {
        log::warn!("Code execution is disabled, every submission will be rejected");
    }

    let runner = create_runner(&judge_config).expect("Failed to prepare scratch workspace");
    let orchestrator = Arc::new(Orchestrator::from_config(
        Arc::new(runner),
        Arc::new(store),
        &judge_config,
    ));
    let job_queue = Arc::new(JobQueue::new());
    let shutdown_token = CancellationToken::new();

    let mut workers = JoinSet::new();
    for i in 1..=n_threads {
        workers.spawn(worker(
            i,
            orchestrator.clone(),
            job_queue.clone(),
            shutdown_token.clone(),
        ));
    }

    let server = build_server(server_config, orchestrator, job_queue)
        .expect("Failed to build server");

    let server_handle = server.handle();
    let server_task = actix_web::rt::spawn(server);

    let stopped_early = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            log::info!("Ctrl-c received, shutting down...");
            false
        }
        res_server = server_task => {
            log::error!("Server terminated unexpectedly: {:?}", res_server);
            true
        }
        Some(res_worker) = workers.join_next() => {
            log::error!("A worker terminated unexpectedly: {:?}", res_worker);
            true
        }
    };

    // Stop accepting requests first so no new job lands in the queue
    server_handle.stop(true).await;
    shutdown_token.cancel();
    log::info!("Waiting for workers to finish their current submission...");
    join_workers(workers).await;

    if stopped_early {
        log::warn!("Shutdown complete after an unexpected stop");
    } else {
        log::info!("Shutdown complete");
    }
    Ok(())
}

async fn join_workers(mut workers: JoinSet<anyhow::Result<()>>) {
    while let Some(joined) = workers.join_next().await {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => log::error!("Worker stopped with error: {e:#}"),
            Err(e) if e.is_panic() => log::error!("Worker panicked: {e:?}"),
            Err(e) => log::error!("Worker task failed: {e:?}"),
        }
    }
}
