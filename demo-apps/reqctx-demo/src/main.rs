use anyhow::{anyhow, bail, ensure, Result};
use futures::future::join_all;
use reqctx_core::{RequestHandle, Store, SweepConfig, Sweeper, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

/// Parsed request metadata a middleware would attach
#[derive(Debug, Clone)]
struct Auth {
    user: String,
    admin: bool,
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "reqctx_demo=info,reqctx_core=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Configuration from environment variables
    let requests: usize = env_or("REQCTX_REQUESTS", 500);
    let sweep_interval_ms: u64 = env_or("REQCTX_SWEEP_INTERVAL_MS", 500);
    let max_age_secs: i64 = env_or("REQCTX_MAX_AGE_SECS", 1);

    let store = Store::new();

    tracing::info!("🧪 Request context demo");
    tracing::info!("   Requests: {}", requests);
    tracing::info!("   Sweep: every {}ms, max age {}s", sweep_interval_ms, max_age_secs);

    run_scoped_requests(&store, requests).await?;
    run_failing_requests(&store).await?;

    // A full-reset sweep would wipe in-flight slots, so start it only now
    let config = SweepConfig::default()
        .with_interval(Duration::from_millis(sweep_interval_ms))
        .with_max_age_secs(max_age_secs);
    let sweeper = Sweeper::spawn(store.clone(), config.clone())?;
    run_leaky_requests(&store, &sweeper, &config).await?;

    sweeper.shutdown();
    tracing::info!("✅ Done, {} slots reclaimed by the sweeper", sweeper.purged_total());

    Ok(())
}

/// Middleware: decode credentials and attach them to the request
fn authenticate(store: &Store, req: &RequestHandle, n: usize) {
    store.set(req, "request_id", Value::new(Uuid::new_v4()));
    store.set(
        req,
        "auth",
        Value::new(Auth {
            user: format!("user-{}", n),
            admin: n % 10 == 0,
        }),
    );
    store.set(req, "started", Value::new(Instant::now()));
}

/// Handler: reads what the middleware attached, knowing only the handle
async fn handle(store: &Store, req: &RequestHandle, n: usize) -> Result<String> {
    let auth = match store.get_ok(req, &"auth").and_then(|v| v.downcast::<Auth>()) {
        Some(auth) => auth,
        None => bail!("{}: no auth attached", req),
    };
    ensure!(auth.user == format!("user-{}", n), "{}: saw another request's data", req);

    // Pretend to do some I/O so requests interleave
    tokio::task::yield_now().await;

    store.set(req, "status", Value::new(200u16));
    Ok(auth.user.clone())
}

/// Access log: dumps a snapshot of the slot after the handler ran
fn access_log(store: &Store, req: &RequestHandle) {
    let Some(slot) = store.get_all(req) else {
        tracing::warn!(%req, "no request context");
        return;
    };

    let request_id = slot
        .get("request_id")
        .and_then(|v| v.downcast_ref::<Uuid>().copied());
    let status = slot
        .get("status")
        .and_then(|v| v.downcast_ref::<u16>().copied());
    let admin = slot
        .get("auth")
        .and_then(|v| v.downcast_ref::<Auth>())
        .map(|a| a.admin)
        .unwrap_or(false);
    let elapsed = slot
        .get("started")
        .and_then(|v| v.downcast_ref::<Instant>())
        .map(|t| t.elapsed());

    tracing::debug!(
        request = req.id(),
        ?request_id,
        ?status,
        admin,
        ?elapsed,
        keys = slot.len(),
        "request finished"
    );
}

/// Many concurrent requests, each wrapped so its slot is cleared at the end
async fn run_scoped_requests(store: &Store, requests: usize) -> Result<()> {
    tracing::info!("Scenario: {} concurrent scoped requests", requests);
    let start = Instant::now();
    let served = Arc::new(AtomicUsize::new(0));

    let futures: Vec<_> = (0..requests)
        .map(|n| {
            let store = store.clone();
            let served = Arc::clone(&served);
            tokio::spawn(async move {
                let req = RequestHandle::new();
                store
                    .scope_async(req, async {
                        authenticate(&store, &req, n);
                        let user = handle(&store, &req, n).await?;
                        access_log(&store, &req);
                        served.fetch_add(1, Ordering::Relaxed);
                        Ok::<_, anyhow::Error>(user)
                    })
                    .await
            })
        })
        .collect();

    for result in join_all(futures).await {
        result??;
    }

    ensure!(served.load(Ordering::Relaxed) == requests, "not every request was served");
    ensure!(store.is_empty(), "{} slots left after scoped requests", store.len());

    tracing::info!("   ✓ {} requests in {:?}, no slots left", requests, start.elapsed());
    Ok(())
}

/// Handlers that fail or panic still get their slot cleared
async fn run_failing_requests(store: &Store) -> Result<()> {
    tracing::info!("Scenario: failing and panicking handlers");

    let req = RequestHandle::new();
    let result: Result<()> = store
        .scope_async(req, async {
            authenticate(store, &req, 1);
            Err::<(), _>(anyhow!("upstream timed out"))
        })
        .await;
    ensure!(result.is_err(), "handler should have failed");

    let panicking = store.clone();
    let req = RequestHandle::new();
    let joined = tokio::spawn(async move {
        panicking
            .scope_async(req, async {
                authenticate(&panicking, &req, 2);
                panic!("handler bug");
            })
            .await
    })
    .await;
    ensure!(joined.is_err(), "handler should have panicked");

    ensure!(store.is_empty(), "{} slots left after failing requests", store.len());
    tracing::info!("   ✓ failed and panicked requests were cleared");
    Ok(())
}

/// Requests that bypass the wrapper leak their slot until the sweeper runs
async fn run_leaky_requests(store: &Store, sweeper: &Sweeper, config: &SweepConfig) -> Result<()> {
    tracing::info!("Scenario: leaked slots reclaimed by the sweeper");

    for n in 0..20 {
        let req = RequestHandle::new();
        authenticate(store, &req, n);
    }
    ensure!(store.len() == 20, "expected 20 leaked slots, found {}", store.len());

    // Whole-second timestamps: a slot is old enough one second past max age
    let deadline = Instant::now()
        + Duration::from_secs(config.max_age_secs.max(0) as u64 + 2)
        + config.interval * 2;
    while sweeper.purged_total() < 20 {
        if Instant::now() > deadline {
            bail!("sweeper left {} slots behind", store.len());
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    ensure!(store.is_empty(), "{} slots left after sweeping", store.len());
    tracing::info!("   ✓ sweeper reclaimed leaked slots");
    Ok(())
}
