//! Seed the record store with sample incidents and rebuild the text index.
//! Destructive: clears existing records first.

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use rca_system::config::Config;
use rca_system::models::RecordInput;
use rca_system::search::text_index::TextIndex;
use rca_system::store::RecordStore;

fn sample_records() -> Vec<RecordInput> {
    vec![
        RecordInput {
            title: "Production Database Connection Timeout".into(),
            category: "Database".into(),
            symptoms: "Application showing \"Connection timeout\" errors. Users unable to login. API response times exceeding 30 seconds.".into(),
            root_cause: "Connection pool exhaustion due to unclosed database connections in the user service microservice. A recent code change introduced a bug where connections were not properly released after transactions.".into(),
            solution: "1. Identified the problematic code in user-service/db.js\n2. Fixed the connection release logic\n3. Deployed hotfix to production\n4. Restarted all affected pods to clear stale connections".into(),
            prevention: Some("Implement connection pool monitoring with alerts when utilization exceeds 80%. Add automated connection leak detection in CI/CD pipeline. Code review checklist updated to include connection handling verification.".into()),
            severity: Some("Critical".into()),
            status: Some("Resolved".into()),
            tags: Some(vec!["database".into(), "connection-pool".into(), "timeout".into(), "mongodb".into()]),
            created_by: Some("John Doe".into()),
        },
        RecordInput {
            title: "API Gateway 502 Bad Gateway Errors".into(),
            category: "Server".into(),
            symptoms: "Intermittent 502 errors on /api/v2/* endpoints. Errors occur during peak traffic hours (2-4 PM EST). Approximately 5% of requests affected.".into(),
            root_cause: "Kubernetes pod resource limits were set too low for the API gateway service. During peak traffic, pods were hitting memory limits and being OOM killed.".into(),
            solution: "1. Increased memory limits from 512Mi to 1Gi\n2. Increased replica count from 3 to 5\n3. Added horizontal pod autoscaler (HPA) configuration\n4. Implemented graceful shutdown handling".into(),
            prevention: Some("Set up resource monitoring dashboards. Configure alerts for pod restarts. Implement load testing as part of release process. Regular capacity planning reviews.".into()),
            severity: Some("High".into()),
            status: Some("Resolved".into()),
            tags: Some(vec!["kubernetes".into(), "api-gateway".into(), "502".into(), "oom".into()]),
            created_by: Some("Jane Smith".into()),
        },
        RecordInput {
            title: "SSL Certificate Expiration Causing Service Outage".into(),
            category: "Network".into(),
            symptoms: "All HTTPS traffic failing with SSL_ERROR_EXPIRED_CERT_ALERT. Mobile apps showing \"Cannot verify server identity\". Complete service unavailability.".into(),
            root_cause: "Production SSL certificate expired. Certificate renewal reminder emails were going to a deprecated team distribution list. No automated monitoring for certificate expiration.".into(),
            solution: "1. Immediately renewed SSL certificate with CA\n2. Deployed new certificate to load balancers\n3. Cleared CDN cache\n4. Verified service restoration".into(),
            prevention: Some("Implement automated certificate monitoring using cert-manager. Set up multiple notification channels (Slack, PagerDuty, email). Create certificate expiration dashboard. Switch to auto-renewing certificates where possible.".into()),
            severity: Some("Critical".into()),
            status: Some("Resolved".into()),
            tags: Some(vec!["ssl".into(), "certificate".into(), "outage".into(), "https".into()]),
            created_by: Some("Mike Johnson".into()),
        },
        RecordInput {
            title: "Memory Leak in Node.js Application".into(),
            category: "App".into(),
            symptoms: "Gradual increase in memory usage over 24-48 hours. Eventually leads to application crashes. Heap dumps show growing number of detached DOM nodes.".into(),
            root_cause: "Event listeners in the websocket handler were not being properly removed when connections closed. Each disconnected client left orphaned listeners consuming memory.".into(),
            solution: "1. Added proper cleanup in connection close handlers\n2. Implemented WeakMap for storing connection metadata\n3. Added memory usage logging\n4. Deployed fix with rolling restart".into(),
            prevention: Some("Add memory usage monitoring with alerts at 70% threshold. Implement automated heap dump collection. Regular profiling as part of performance testing. Code review focus on event listener cleanup.".into()),
            severity: Some("Medium".into()),
            status: Some("Resolved".into()),
            tags: Some(vec!["memory-leak".into(), "nodejs".into(), "websocket".into(), "event-listeners".into()]),
            created_by: Some("Sarah Williams".into()),
        },
        RecordInput {
            title: "Redis Cache Cluster Failover Issues".into(),
            category: "Database".into(),
            symptoms: "Session data intermittently unavailable. Users being logged out randomly. High latency spikes every few minutes.".into(),
            root_cause: "Redis Sentinel was misconfigured with incorrect quorum settings. When primary node experienced brief network blip, Sentinel initiated unnecessary failover, but secondary was not fully synced.".into(),
            solution: "1. Corrected Sentinel quorum configuration\n2. Enabled Redis persistence (AOF) on all nodes\n3. Increased replication timeout values\n4. Tested failover procedure".into(),
            prevention: Some("Document Redis cluster architecture. Regular failover testing (chaos engineering). Monitor replication lag. Implement circuit breaker for cache operations.".into()),
            severity: Some("High".into()),
            status: Some("Resolved".into()),
            tags: Some(vec!["redis".into(), "cache".into(), "sentinel".into(), "failover".into()]),
            created_by: Some("Tom Brown".into()),
        },
        RecordInput {
            title: "Cross-Site Scripting (XSS) Vulnerability in User Profile".into(),
            category: "Security".into(),
            symptoms: "Security audit identified stored XSS in user bio field. Malicious scripts could execute when viewing profiles. No known exploitation in production.".into(),
            root_cause: "User input in biography field was not being sanitized before storage or properly escaped during rendering. React dangerouslySetInnerHTML was used without sanitization.".into(),
            solution: "1. Implemented DOMPurify for input sanitization\n2. Removed dangerouslySetInnerHTML usage\n3. Added Content Security Policy headers\n4. Sanitized all existing user bio entries in database".into(),
            prevention: Some("Security training for developers. Automated security scanning in CI/CD. Regular penetration testing. Input validation library standardization across projects.".into()),
            severity: Some("High".into()),
            status: Some("Resolved".into()),
            tags: Some(vec!["security".into(), "xss".into(), "vulnerability".into(), "sanitization".into()]),
            created_by: Some("Alex Chen".into()),
        },
    ]
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env();
    std::fs::create_dir_all(&config.data_dir)
        .with_context(|| format!("creating data dir {}", config.data_dir.display()))?;

    let store = RecordStore::open(config.db_path()).context("opening record store")?;
    store.clear();
    tracing::info!("Cleared existing RCAs");

    let mut created = Vec::new();
    for input in sample_records() {
        let validated = input.validate()?;
        created.push(store.create(validated));
    }
    tracing::info!("Created {} sample RCAs", created.len());

    let index = TextIndex::open_or_create(&config.index_dir()).context("opening text index")?;
    index.clear()?;
    index.add_all(&created)?;
    tracing::info!("Rebuilt text index");

    tracing::info!("Database seeded successfully");
    Ok(())
}
