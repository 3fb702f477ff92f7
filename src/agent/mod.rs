pub mod dispatch;

use std::sync::Arc;

use anyhow::{Context, Result};
use prometheus::Registry;
use tracing::info;

use crate::config::Config;
use crate::correlate::sampling::SampleEvery;
use crate::export::MetricsServer;
use crate::ingest::stats::IngestStats;
use crate::ingest::SocketIngest;
use crate::parsers::contention::ContentionParser;
use crate::parsers::exceptions::ExceptionParser;
use crate::parsers::gc::GcParser;
use crate::parsers::jit::JitParser;
use crate::parsers::threadpool::ThreadPoolParser;
use crate::producers::contention::ContentionProducer;
use crate::producers::exceptions::ExceptionProducer;
use crate::producers::gc::GcProducer;
use crate::producers::jit::JitProducer;
use crate::producers::threadpool::ThreadPoolProducer;
use crate::producers::MetricProducer;

use dispatch::Dispatcher;

/// One registrable runtime subsystem: builds its parser/producer pair
/// and wires the parser into the dispatcher.
struct CollectorDef {
    name: &'static str,
    enabled: fn(&Config) -> bool,
    build: fn(&Config, Arc<IngestStats>, &mut Dispatcher) -> Result<Box<dyn MetricProducer>>,
}

/// Every subsystem the agent can collect. Fixed at compile time;
/// configuration only toggles entries on and off.
const COLLECTORS: &[CollectorDef] = &[
    CollectorDef {
        name: "gc",
        enabled: |cfg| cfg.collectors.gc.enabled,
        build: build_gc,
    },
    CollectorDef {
        name: "contention",
        enabled: |cfg| cfg.collectors.contention.enabled,
        build: build_contention,
    },
    CollectorDef {
        name: "jit",
        enabled: |cfg| cfg.collectors.jit.enabled,
        build: build_jit,
    },
    CollectorDef {
        name: "threadpool",
        enabled: |cfg| cfg.collectors.threadpool.enabled,
        build: build_threadpool,
    },
    CollectorDef {
        name: "exceptions",
        enabled: |cfg| cfg.collectors.exceptions.enabled,
        build: build_exceptions,
    },
];

fn build_gc(
    cfg: &Config,
    stats: Arc<IngestStats>,
    dispatcher: &mut Dispatcher,
) -> Result<Box<dyn MetricProducer>> {
    let parser = Arc::new(GcParser::new(
        cfg.correlation.ttl,
        cfg.correlation.capacity,
        stats,
    )?);
    let producer = GcProducer::new(&parser, &cfg.collectors.gc.histogram_buckets)?;
    dispatcher.register(parser);
    Ok(Box::new(producer))
}

fn build_contention(
    cfg: &Config,
    _stats: Arc<IngestStats>,
    dispatcher: &mut Dispatcher,
) -> Result<Box<dyn MetricProducer>> {
    let sample_every = sample_every(cfg.collectors.contention.sample_every)?;
    let parser = Arc::new(ContentionParser::new(
        sample_every,
        cfg.correlation.ttl,
        cfg.correlation.capacity,
    )?);
    let producer = ContentionProducer::new(&parser)?;
    dispatcher.register(parser);
    Ok(Box::new(producer))
}

fn build_jit(
    cfg: &Config,
    stats: Arc<IngestStats>,
    dispatcher: &mut Dispatcher,
) -> Result<Box<dyn MetricProducer>> {
    let sample_every = sample_every(cfg.collectors.jit.sample_every)?;
    let parser = Arc::new(JitParser::new(
        sample_every,
        cfg.correlation.ttl,
        cfg.correlation.capacity,
        stats,
    )?);
    let producer = JitProducer::new(&parser)?;
    dispatcher.register(parser);
    Ok(Box::new(producer))
}

fn build_threadpool(
    _cfg: &Config,
    stats: Arc<IngestStats>,
    dispatcher: &mut Dispatcher,
) -> Result<Box<dyn MetricProducer>> {
    let parser = Arc::new(ThreadPoolParser::new(stats));
    let producer = ThreadPoolProducer::new(&parser)?;
    dispatcher.register(parser);
    Ok(Box::new(producer))
}

fn build_exceptions(
    _cfg: &Config,
    _stats: Arc<IngestStats>,
    dispatcher: &mut Dispatcher,
) -> Result<Box<dyn MetricProducer>> {
    let parser = Arc::new(ExceptionParser::new());
    let producer = ExceptionProducer::new(&parser)?;
    dispatcher.register(parser);
    Ok(Box::new(producer))
}

fn sample_every(divisor: u32) -> Result<SampleEvery> {
    SampleEvery::from_u32(divisor)
        .with_context(|| format!("unsupported sample_every {divisor}"))
}

/// Agent orchestrates all components: ingest listener, dispatcher,
/// producers, and the exposition server.
pub struct Agent {
    cfg: Config,
    registry: Registry,
    dispatcher: Option<Arc<Dispatcher>>,
    ingest: Option<SocketIngest>,
    server: Option<MetricsServer>,
}

impl Agent {
    pub fn new(cfg: Config) -> Self {
        Self {
            cfg,
            registry: Registry::new(),
            dispatcher: None,
            ingest: None,
            server: None,
        }
    }

    /// Start all components and begin serving.
    pub async fn start(&mut self) -> Result<()> {
        let stats = Arc::new(IngestStats::new());
        let mut dispatcher = Dispatcher::new();
        let mut producers: Vec<Box<dyn MetricProducer>> = Vec::new();

        // 1. Build every enabled collector and register its metrics.
        for def in COLLECTORS {
            if !(def.enabled)(&self.cfg) {
                info!(collector = def.name, "collector disabled");
                continue;
            }
            let producer = (def.build)(&self.cfg, Arc::clone(&stats), &mut dispatcher)
                .with_context(|| format!("building {} collector", def.name))?;
            producer
                .register(&self.registry)
                .with_context(|| format!("registering {} metrics", def.name))?;
            info!(collector = def.name, "collector registered");
            producers.push(producer);
        }
        let dispatcher = Arc::new(dispatcher);

        // 2. Start the exposition server.
        let server = MetricsServer::new(
            &self.cfg.metrics.addr,
            self.registry.clone(),
            producers,
            Arc::clone(&stats),
        )?;
        server.start().await.context("starting metrics server")?;

        // 3. Start accepting runtime connections.
        let mut ingest = SocketIngest::new(
            self.cfg.ingest.addr.clone(),
            Arc::clone(&dispatcher),
            stats,
        );
        ingest.start().await.context("starting ingest listener")?;

        self.dispatcher = Some(dispatcher);
        self.server = Some(server);
        self.ingest = Some(ingest);
        info!("agent started");
        Ok(())
    }

    /// Stop components in reverse start order.
    pub async fn stop(&mut self) {
        if let Some(mut ingest) = self.ingest.take() {
            ingest.stop().await;
        }
        if let Some(server) = self.server.take() {
            server.stop().await;
        }
        if let Some(dispatcher) = self.dispatcher.take() {
            dispatcher.close();
        }
        info!("agent stopped");
    }

    /// The ingest listener's bound address, once started.
    pub fn ingest_addr(&self) -> Option<std::net::SocketAddr> {
        self.ingest.as_ref().and_then(|i| i.local_addr())
    }

    /// The metrics server's bound address, once started.
    pub fn metrics_addr(&self) -> Option<std::net::SocketAddr> {
        self.server.as_ref().and_then(|s| s.local_addr())
    }
}
