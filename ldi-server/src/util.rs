//! General server utilities: websocket upgrade glue and frame-timing
//! metrics (§10.5 — ambient observability, not a spec feature).

use std::{
    collections::HashMap,
    fmt::Display,
    fs,
    future::Future,
    io::{self, Write},
    path,
    sync::{LazyLock, Mutex, MutexGuard},
    time::{Duration, Instant},
};

use axum::{
    extract::{ws::WebSocket, FromRequest, State, WebSocketUpgrade},
    handler::Handler,
};

/// Creates a [`Handler`] that calls `cb` once a websocket connection is
/// established.
pub fn ws_upgrader<M, S: Send + Sync + Clone + 'static, Fut>(
    cb: impl FnOnce(S, WebSocket) -> Fut + Send + Sync + Clone + 'static,
) -> impl Handler<(M, State<S>, WebSocketUpgrade), S>
where
    WebSocketUpgrade: FromRequest<S, M>,
    Fut: Future<Output = ()> + Send + 'static,
{
    |State(state), ws: WebSocketUpgrade| async move { ws.on_upgrade(move |sock| cb(state, sock)) }
}

/// Times successive stages of one render-loop iteration against a shared
/// basis, pushing each interval into the global [`Metrics`].
pub struct IntervalTimer {
    base_time: Instant,
    mark_time: Instant,
}

impl IntervalTimer {
    #[inline]
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        let now = Instant::now();
        Self { base_time: now, mark_time: now }
    }

    #[inline]
    pub fn start(&mut self) {
        let now = Instant::now();
        self.base_time = now;
        self.mark_time = now;
    }

    /// Records the time since the previous marking under `name`.
    #[inline]
    pub fn mark(&mut self, name: &str) {
        let now = Instant::now();
        let took = now - self.mark_time;
        Metrics::push(name, took.as_secs_f64() * 1000.);
        self.mark_time = now;
    }

    /// Records the time since this timer's basis under `name`.
    #[inline]
    pub fn mark_from_base(&mut self, name: &str) {
        let now = Instant::now();
        let took = now - self.base_time;
        Metrics::push(name, took.as_secs_f64() * 1000.);
        self.mark_time = now;
    }
}

static GLOBAL_METRICS: LazyLock<Mutex<Metrics>> = LazyLock::new(|| Mutex::new(Metrics::new()));

/// Named running statistics, one singleton shared across the process.
pub struct Metrics {
    marks: HashMap<String, Metric>,
}

impl Metrics {
    fn new() -> Self {
        Self { marks: HashMap::new() }
    }

    fn lock_global() -> MutexGuard<'static, Self> {
        match GLOBAL_METRICS.lock() {
            Ok(g) => g,
            Err(mut err) => {
                **err.get_mut() = Metrics::new();
                err.into_inner()
            }
        }
    }

    pub fn push(name: &str, v: f64) {
        Self::lock_global().marks.entry(name.to_string()).or_default().push(v);
    }

    pub fn current_marks() -> HashMap<String, (f64, f64, usize)> {
        Self::lock_global()
            .marks
            .iter()
            .map(|(k, v)| (k.clone(), (v.average(), v.std_dev(), v.len())))
            .collect()
    }

    pub fn reset() {
        Self::lock_global().marks = HashMap::new();
    }

    pub fn write_csv(out_path: impl AsRef<path::Path>) -> io::Result<()> {
        let mut out = fs::File::create(out_path)?;
        writeln!(out, "time,name,mean,stddev,samples")?;
        let mut marks = Self::current_marks().into_iter().collect::<Vec<_>>();
        marks.sort_by(|(a, _), (b, _)| a.cmp(b));
        for (name, (mean, stddev, count)) in marks {
            writeln!(out, "{},{name},{mean:.2},{stddev:.2},{count}", chrono::Local::now())?;
        }
        Ok(())
    }

    pub fn with(f: impl FnOnce(&Self)) {
        f(&Self::lock_global())
    }
}

impl Display for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut metrics = self.marks.iter().collect::<Vec<_>>();
        metrics.sort_by_key(|(n, _)| *n);
        let mut write_comma = false;
        for (n, m) in metrics {
            if write_comma {
                f.write_str(", ")?;
            }
            write!(f, "{n} = {:.1?}±{:.1?}", m.average(), m.std_dev())?;
            write_comma = true;
        }
        Ok(())
    }
}

/// Running sum/sum-of-squares/count, enough for mean and standard
/// deviation without keeping every sample.
#[derive(Clone, Copy, Default)]
pub struct Metric {
    sum: f64,
    sum_sq: f64,
    count: u32,
}

impl Metric {
    #[inline]
    pub fn push(&mut self, v: f64) {
        self.sum += v;
        self.sum_sq += v * v;
        self.count += 1;
    }

    #[inline]
    pub fn average(self) -> f64 {
        self.sum / f64::from(self.count)
    }

    #[inline]
    pub fn std_dev(self) -> f64 {
        let n = f64::from(self.count);
        let exp_x = self.sum / n;
        let exp_x2 = self.sum_sq / n;
        exp_x.mul_add(-exp_x, exp_x2).sqrt()
    }

    #[inline]
    #[allow(clippy::len_without_is_empty)]
    pub const fn len(self) -> usize {
        self.count as _
    }
}

/// Spawns the periodic metrics-logging task `stitching_server::main`
/// drives via its `log_delta` flag.
pub fn spawn_metrics_logger(period: Duration, csv_path: Option<std::path::PathBuf>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(period).await;
            Metrics::with(|m| tracing::info!("timing {}", m));
            if let Some(p) = &csv_path {
                if let Err(err) = Metrics::write_csv(p) {
                    tracing::error!("error saving metrics: {err}");
                }
            }
            Metrics::reset();
        }
    })
}
