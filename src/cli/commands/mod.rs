use std::path::Path;
use std::sync::Arc;

use anyhow::Result;

use crate::config::{self, StorageBackend};
use crate::coordinator::{ReturnCoordinator, SessionLock, SessionLockError};
use crate::store::{
    ChangeFeed, FileStore, MemoryStore, PhotoStore, RecordStore, SessionCache, StaticIdentity,
};

pub mod arrivals;
pub mod audit;
pub mod damage;
pub mod fee;
pub mod init;
pub mod photo;
pub mod seed;
pub mod status;
pub mod steps;

#[allow(async_fn_in_trait)]
pub trait Command {
    async fn execute(&self) -> Result<()>;
}

/// Build the coordinator from configuration and hand it to the command
/// body.
pub async fn with_coordinator<F, Fut, R>(f: F) -> Result<R>
where
    F: FnOnce(ReturnCoordinator) -> Fut + Send,
    Fut: std::future::Future<Output = Result<R>> + Send,
    R: Send,
{
    print!("🔄 Opening branch records... ");
    std::io::Write::flush(&mut std::io::stdout()).unwrap();

    match build_coordinator().await {
        Ok(coordinator) => {
            println!("✅");
            f(coordinator).await
        }
        Err(e) => {
            println!("❌ Failed to open branch storage: {e:?}");
            Err(e)
        }
    }
}

pub async fn build_coordinator() -> Result<ReturnCoordinator> {
    let settings = config::config()?;
    let (records, photos) = build_stores(settings).await?;

    let operator_id = settings
        .branch
        .operator_id
        .clone()
        .unwrap_or_else(|| "desk".to_string());
    let operator_name = settings
        .branch
        .operator_name
        .clone()
        .unwrap_or_else(|| operator_id.clone());

    let cache = Arc::new(SessionCache::with_capacity(
        settings.cache.ttl(),
        settings.cache.capacity,
    ));
    let feed = ChangeFeed::default();
    // Edits arriving on the feed drop the affected cache entry instead
    // of waiting out the TTL. The task ends with the feed.
    let _listener = cache.listen(&feed);

    Ok(ReturnCoordinator::new(
        records,
        photos,
        Arc::new(StaticIdentity::new(operator_id, operator_name)),
    )
    .with_policy(settings.fees.policy())
    .with_cache(cache)
    .with_feed(feed))
}

/// Open the configured backend. The same store serves records and
/// photos; the split into two trait handles is what the coordinator
/// expects.
pub async fn build_stores(
    settings: &config::BacklotConfig,
) -> Result<(Arc<dyn RecordStore>, Arc<dyn PhotoStore>)> {
    Ok(match settings.storage.backend {
        StorageBackend::Memory => {
            let store = Arc::new(MemoryStore::new());
            (store.clone() as Arc<dyn RecordStore>, store)
        }
        StorageBackend::File => {
            let store = Arc::new(FileStore::new(settings.storage.data_dir.as_str()));
            (store.clone() as Arc<dyn RecordStore>, store)
        }
        StorageBackend::Sqlite => sqlite_stores(settings).await?,
    })
}

#[cfg(feature = "database")]
async fn sqlite_stores(
    settings: &config::BacklotConfig,
) -> Result<(Arc<dyn RecordStore>, Arc<dyn PhotoStore>)> {
    use crate::store::SqliteStore;

    let database = settings.storage.database.as_ref().ok_or_else(|| {
        anyhow::anyhow!("storage.backend is sqlite but [storage.database] is not configured")
    })?;
    let store = Arc::new(SqliteStore::connect_with(&database.url, database.max_connections).await?);
    Ok((store.clone(), store))
}

#[cfg(not(feature = "database"))]
async fn sqlite_stores(
    _settings: &config::BacklotConfig,
) -> Result<(Arc<dyn RecordStore>, Arc<dyn PhotoStore>)> {
    anyhow::bail!("sqlite backend needs a build with --features database")
}

/// Hold the per-contract session lock for the duration of a mutating
/// command.
pub fn acquire_session_lock(reference: &str) -> Result<SessionLock> {
    let settings = config::config()?;
    match SessionLock::acquire(Path::new(&settings.branch.lock_dir), reference) {
        Ok(lock) => Ok(lock),
        Err(SessionLockError::Held { reference }) => {
            println!("🔒 Contract {reference} is being handled at another workstation");
            println!("   Finish there or wait for that session to end, then retry.");
            Err(anyhow::anyhow!("session lock for {reference} is held"))
        }
        Err(err) => Err(err.into()),
    }
}

/// The command line that performs a given step, for "what next" hints.
pub fn step_command_hint(step: crate::returns::states::ReturnStep, reference: &str) -> String {
    use crate::returns::states::ReturnStep;
    match step {
        ReturnStep::Intake => format!("backlot intake {reference} --odometer <km> --fuel <0-8>"),
        ReturnStep::Evidence => format!("backlot evidence {reference}"),
        ReturnStep::Issues => format!("backlot issues {reference}"),
        ReturnStep::Closeout => format!("backlot closeout {reference}"),
        ReturnStep::Deposit => format!("backlot settle {reference}"),
    }
}

/// One line per flow failure, phrased for the operator at the desk.
pub fn report_flow_error(err: &crate::coordinator::ReturnFlowError) {
    use crate::coordinator::ReturnFlowError;
    match err {
        ReturnFlowError::Validation(e) => println!("❌ Not accepted: {e}"),
        ReturnFlowError::Precondition(e) => println!("⛔ Refused: {e}"),
        ReturnFlowError::Storage(e) => {
            println!("⚠️  Storage problem: {e}");
            if err.is_retryable() {
                println!("   Nothing was advanced; safe to retry.");
            }
        }
    }
}

pub async fn show_desk_overview() -> Result<()> {
    println!("🚗 Backlot - Vehicle Return Processing");
    println!();
    println!("Working a return:");
    println!("  📋 backlot arrivals            # See what is due back");
    println!("  🔎 backlot status R-20441      # Where a return stands");
    println!("  🛬 backlot intake R-20441 --odometer 42480 --fuel 6");
    println!("  📷 backlot photo R-20441 front-left");
    println!("  ✅ backlot evidence R-20441    # Confirm photos on file");
    println!("  🔧 backlot issues R-20441      # Finish damage review");
    println!("  💵 backlot fee R-20441         # Decide the late fee");
    println!("  📦 backlot closeout R-20441");
    println!("  💰 backlot settle R-20441      # Release the deposit");
    println!();
    println!("Branch setup:");
    println!("  ⚙️  backlot init               # Write backlot.toml and data dirs");
    println!("  🌱 backlot seed                # Load demo contracts");
    println!();
    println!("💡 Steps unlock in order; a step only counts once its write lands.");
    Ok(())
}
