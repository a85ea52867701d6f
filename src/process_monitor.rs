//! Process Monitor (spec §4.9), grounded on
//! `original_source/process_monitor.py` and
//! `process_monitor_helpers/{scanner,scan_coordinator,service_patterns}.py`:
//! a cached process table refreshed by a background scan loop, avoiding the
//! CPU spikes of scanning on every lookup.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Notify, RwLock};
use tokio::task::JoinHandle;

const FULL_SCAN_TIMEOUT: Duration = Duration::from_secs(5);
const DEAD_PROCESS_THRESHOLD: f64 = 0.1;

#[derive(Debug, Clone)]
pub struct ProcessInfo {
    pub pid: u32,
    pub name: String,
    pub cmdline: Vec<String>,
    pub last_seen: Instant,
}

#[derive(Default)]
struct CachedState {
    process_cache: HashMap<u32, ProcessInfo>,
    service_cache: HashMap<String, Vec<ProcessInfo>>,
    redis_processes: Vec<ProcessInfo>,
    last_full_scan: Option<Instant>,
}

#[derive(Debug, Clone)]
pub struct ProcessMonitorConfig {
    pub scan_interval: Duration,
    pub service_patterns: HashMap<String, Vec<String>>,
}

impl Default for ProcessMonitorConfig {
    fn default() -> Self {
        Self { scan_interval: Duration::from_secs(60), service_patterns: default_service_patterns() }
    }
}

/// Keyword patterns used to classify a process's command line into a named
/// service bucket (spec §4.9 / `service_patterns.py`).
pub fn default_service_patterns() -> HashMap<String, Vec<String>> {
    [
        ("kalshi", vec!["src.kalshi"]),
        ("deribit", vec!["src.deribit"]),
        ("monitor", vec!["src.monitor", "simple_monitor"]),
        ("cfb", vec!["src.cfb"]),
        ("weather", vec!["src.weather"]),
        ("tracker", vec!["src.tracker"]),
        ("price_alert", vec!["src.price_alert"]),
        ("pdf", vec!["src.pdf"]),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.into_iter().map(str::to_string).collect()))
    .collect()
}

/// A process matches a service pattern when every expected substring
/// appears somewhere in its command-line arguments.
pub fn matches_service_pattern(cmdline: &[String], pattern: &[String]) -> bool {
    if cmdline.is_empty() {
        return false;
    }
    pattern.iter().all(|expected| cmdline.iter().any(|arg| arg.contains(expected.as_str())))
}

pub fn is_redis_process(name: &str, cmdline: &[String]) -> bool {
    if name.contains("redis-server") {
        return true;
    }
    cmdline.iter().any(|arg| arg.to_lowercase().contains("redis"))
}

/// Singleton-style cached process table (spec §4.9). Callers typically
/// hold one instance behind an `Arc` shared across services.
pub struct ProcessMonitor {
    config: ProcessMonitorConfig,
    state: Arc<RwLock<CachedState>>,
    shutdown: Arc<Notify>,
    running: AtomicBool,
    background_task: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl ProcessMonitor {
    pub fn new(config: ProcessMonitorConfig) -> Self {
        Self {
            config,
            state: Arc::new(RwLock::new(CachedState::default())),
            shutdown: Arc::new(Notify::new()),
            running: AtomicBool::new(false),
            background_task: tokio::sync::Mutex::new(None),
        }
    }

    pub async fn initialize(&self) {
        self.perform_full_scan().await;
    }

    pub async fn start_background_scanning(self: &Arc<Self>) {
        let mut task_slot = self.background_task.lock().await;
        if task_slot.is_some() {
            return;
        }
        self.initialize().await;
        self.running.store(true, Ordering::SeqCst);

        let monitor = Arc::clone(self);
        *task_slot = Some(tokio::spawn(async move {
            monitor.background_scan_loop().await;
        }));
        tracing::info!(interval_s = self.config.scan_interval.as_secs(), "started process monitor background scanning");
    }

    pub async fn stop_background_scanning(&self) {
        let mut task_slot = self.background_task.lock().await;
        let Some(task) = task_slot.take() else { return };
        tracing::info!("stopping process monitor background scanning");
        self.running.store(false, Ordering::SeqCst);
        self.shutdown.notify_one();

        if tokio::time::timeout(Duration::from_secs(2), task).await.is_err() {
            tracing::warn!("background scan task did not exit within grace period; cancelling");
        }
        tracing::info!("process monitor background scanning stopped");
    }

    async fn background_scan_loop(self: Arc<Self>) {
        while self.running.load(Ordering::SeqCst) {
            if let Err(e) = std::panic::AssertUnwindSafe(self.perform_incremental_scan())
                .catch_unwind()
                .await
            {
                tracing::error!(?e, "background scan loop encountered an error");
            }

            tokio::select! {
                _ = tokio::time::sleep(self.config.scan_interval) => {}
                _ = self.shutdown.notified() => break,
            }
        }
    }

    async fn ensure_cache_fresh(&self) {
        let stale = {
            let state = self.state.read().await;
            match state.last_full_scan {
                Some(last) => last.elapsed() > self.config.scan_interval,
                None => true,
            }
        };
        if stale {
            self.perform_incremental_scan().await;
        }
    }

    /// Drops dead PIDs from the cache; triggers a full rescan if more than
    /// [`DEAD_PROCESS_THRESHOLD`] of cached processes have died.
    async fn perform_incremental_scan(&self) -> bool {
        let dead_pids: Vec<u32> = {
            let state = self.state.read().await;
            state.process_cache.keys().copied().filter(|pid| !pid_exists(*pid)).collect()
        };

        if dead_pids.is_empty() {
            return false;
        }

        let cached_count = {
            let mut state = self.state.write().await;
            for pid in &dead_pids {
                state.process_cache.remove(pid);
            }
            state.process_cache.len()
        };

        let ratio_trigger = cached_count > 0 && dead_pids.len() as f64 > cached_count as f64 * DEAD_PROCESS_THRESHOLD;
        if ratio_trigger {
            tracing::info!(dead = dead_pids.len(), cached = cached_count, "too many dead processes; triggering full scan");
            self.perform_full_scan().await;
            true
        } else {
            false
        }
    }

    /// Offloads the actual `sysinfo` enumeration to a blocking task, with a
    /// timeout matching the original's `ThreadPoolExecutor` + `wait_for`.
    async fn perform_full_scan(&self) {
        let patterns = self.config.service_patterns.clone();
        let scan = tokio::task::spawn_blocking(move || scan_all_processes(&patterns));

        match tokio::time::timeout(FULL_SCAN_TIMEOUT, scan).await {
            Ok(Ok((process_cache, service_cache, redis_processes))) => {
                let mut state = self.state.write().await;
                state.process_cache = process_cache;
                state.service_cache = service_cache;
                state.redis_processes = redis_processes;
                state.last_full_scan = Some(Instant::now());
            }
            Ok(Err(e)) => {
                tracing::error!(error = %e, "full process scan task panicked");
            }
            Err(_) => {
                tracing::error!("full process scan timed out");
            }
        }
    }

    pub async fn get_service_processes(&self, service_name: &str) -> Vec<ProcessInfo> {
        self.ensure_cache_fresh().await;
        self.state.read().await.service_cache.get(service_name).cloned().unwrap_or_default()
    }

    pub async fn get_redis_processes(&self) -> Vec<ProcessInfo> {
        self.ensure_cache_fresh().await;
        self.state.read().await.redis_processes.clone()
    }

    pub async fn get_process_by_pid(&self, pid: u32) -> Option<ProcessInfo> {
        self.ensure_cache_fresh().await;
        self.state.read().await.process_cache.get(&pid).cloned()
    }

    pub async fn find_processes_by_keywords(&self, keywords: &[String]) -> Vec<ProcessInfo> {
        self.ensure_cache_fresh().await;
        let state = self.state.read().await;
        state
            .process_cache
            .values()
            .filter(|p| keywords.iter().any(|kw| p.cmdline.iter().any(|arg| arg.contains(kw.as_str()))))
            .cloned()
            .collect()
    }
}

fn pid_exists(pid: u32) -> bool {
    let mut system = sysinfo::System::new();
    system.refresh_processes(sysinfo::ProcessesToUpdate::Some(&[sysinfo::Pid::from_u32(pid)]), true);
    system.process(sysinfo::Pid::from_u32(pid)).is_some()
}

type ScanResult = (HashMap<u32, ProcessInfo>, HashMap<String, Vec<ProcessInfo>>, Vec<ProcessInfo>);

fn scan_all_processes(patterns: &HashMap<String, Vec<String>>) -> ScanResult {
    let mut system = sysinfo::System::new();
    system.refresh_processes(sysinfo::ProcessesToUpdate::All, true);

    let mut process_cache = HashMap::new();
    let mut service_cache: HashMap<String, Vec<ProcessInfo>> = HashMap::new();
    let mut redis_processes = Vec::new();

    for (pid, process) in system.processes() {
        let pid = pid.as_u32();
        let name = process.name().to_string_lossy().to_string();
        let cmdline: Vec<String> = process.cmd().iter().map(|arg| arg.to_string_lossy().to_string()).collect();
        let info = ProcessInfo { pid, name: name.clone(), cmdline: cmdline.clone(), last_seen: Instant::now() };

        for (service_name, pattern) in patterns {
            if matches_service_pattern(&cmdline, pattern) {
                service_cache.entry(service_name.clone()).or_default().push(info.clone());
                break;
            }
        }
        if is_redis_process(&name, &cmdline) {
            redis_processes.push(info.clone());
        }

        process_cache.insert(pid, info);
    }

    (process_cache, service_cache, redis_processes)
}

// `catch_unwind` needs a `FutureExt` impl; provide a minimal local shim so
// the background loop survives a panicking scan without pulling in
// `futures::FutureExt` for this one call site.
trait CatchUnwind: std::future::Future + Sized {
    fn catch_unwind(self) -> futures::future::CatchUnwind<futures::future::AssertUnwindSafe<Self>>
    where
        Self: std::panic::UnwindSafe,
    {
        futures::FutureExt::catch_unwind(futures::future::AssertUnwindSafe(self))
    }
}
impl<F: std::future::Future> CatchUnwind for F {}
