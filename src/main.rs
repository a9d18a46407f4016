use std::env;
use std::sync::Arc;
use std::time::Duration;

use pingora_core::server::Server;
use pingora_proxy::http_proxy_service;

use hostgate::balancer::StrategyBalancer;
use hostgate::cache::CacheService;
use hostgate::config::Config;
use hostgate::engine::ProxyEngine;
use hostgate::header_rewrite::HeaderRewriter;
use hostgate::health_check::HealthChecker;
use hostgate::registry::{Host, Service, ServiceRegistry};

fn build_registry(config: &Config) -> ServiceRegistry {
    let services = config
        .services
        .iter()
        .map(|svc_cfg| {
            let hosts = svc_cfg
                .hosts
                .iter()
                .map(|h| Arc::new(Host::new(h.socket_addr())))
                .collect();
            Arc::new(Service {
                name: svc_cfg.name.clone(),
                domain: svc_cfg.domain.clone(),
                strategy: svc_cfg.strategy,
                hosts,
            })
        })
        .collect();
    ServiceRegistry::new(services)
}

fn main() {
    env_logger::init();

    let conf_path = env::args()
        .nth(1)
        .expect("usage: hostgate <config.yaml>");
    let config = Config::load_from_yaml(&conf_path).expect("failed to load configuration");

    log::info!("Building service registry...");
    let registry = Arc::new(build_registry(&config));

    let cache = Arc::new(CacheService::new(config.cache.capacity));

    let engine = ProxyEngine {
        registry: registry.clone(),
        balancer: StrategyBalancer::default(),
        cache,
        header_rewriter: HeaderRewriter,
        max_body_bytes: config.max_body_bytes,
        upstream_timeout: Duration::from_secs(config.upstream_timeout_secs),
    };

    let listen_addr = config.listen.to_string();
    let health_check_conf = config.health_check.clone();
    let mut server = Server::new_with_opt_and_conf(None, config.pingora);

    let mut proxy_service = http_proxy_service(&server.configuration, engine);
    proxy_service.add_tcp(&listen_addr);

    let health_checker = HealthChecker::new(
        registry,
        health_check_conf.interval_secs,
        health_check_conf.initial_delay_secs,
        health_check_conf.timeout_secs,
    );

    log::info!("Bootstrapping...");
    server.bootstrap();

    server.add_service(proxy_service);
    server.add_service(health_checker);

    log::info!("Starting server on {listen_addr}...");
    server.run_forever();
}
