//! HTTP API: occupancy queries, region configuration, and Prometheus metrics
//!
//! Uses hyper for the HTTP server. Routing is a plain function of
//! `(method, path, query, body)` so it can be tested without sockets.

use crate::domain::region::RegionState;
use crate::error::OccupancyError;
use crate::infra::metrics::{Metrics, MetricsSummary, METRICS_BUCKET_BOUNDS, METRICS_NUM_BUCKETS};
use crate::services::counters::CounterSnapshot;
use crate::services::polygon_store::{AppendOutcome, RegionView};
use crate::services::query::{ConfigService, QueryService};
use bytes::Bytes;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::fmt::Write;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, error, info};

/// Request bodies are a handful of points; anything larger is rejected
const MAX_BODY_BYTES: usize = 64 * 1024;

/// Everything a request handler needs, cheap to clone per connection
#[derive(Clone)]
pub struct ApiContext {
    pub query: QueryService,
    pub config: ConfigService,
    pub metrics: Arc<Metrics>,
    pub site_id: Arc<str>,
}

#[derive(Debug, Deserialize)]
struct AreaRequest {
    points: Vec<Vec<i64>>,
}

#[derive(Debug, Deserialize)]
struct PointRequest {
    x: i64,
    y: i64,
}

#[derive(Serialize)]
struct AreaView<'a> {
    status: &'static str,
    points: &'a RegionState,
    revision: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    outcome: Option<&'static str>,
}

impl<'a> AreaView<'a> {
    fn new(view: &'a RegionView, outcome: Option<AppendOutcome>) -> Self {
        Self {
            status: view.state.status(),
            points: &view.state,
            revision: view.revision,
            outcome: outcome.map(|o| o.as_str()),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'static str,
    detail: &'a str,
}

/// Prometheus metric type
enum MetricType {
    Counter,
    Gauge,
}

impl MetricType {
    fn as_str(&self) -> &'static str {
        match self {
            MetricType::Counter => "counter",
            MetricType::Gauge => "gauge",
        }
    }
}

/// Write a simple metric (counter or gauge) with site label
fn write_metric(
    output: &mut String,
    name: &str,
    help: &str,
    typ: MetricType,
    site: &str,
    val: u64,
) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} {}", typ.as_str());
    let _ = writeln!(output, "{name}{{site=\"{site}\"}} {val}");
}

/// Write a histogram metric with buckets, sum, and count
fn write_histogram(
    output: &mut String,
    name: &str,
    help: &str,
    site: &str,
    buckets: &[u64; METRICS_NUM_BUCKETS],
    sum: u64,
) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} histogram");

    let mut cumulative = 0u64;
    for (i, &bound) in METRICS_BUCKET_BOUNDS.iter().enumerate() {
        cumulative += buckets[i];
        let _ = writeln!(output, "{name}_bucket{{site=\"{site}\",le=\"{bound}\"}} {cumulative}");
    }
    cumulative += buckets[METRICS_NUM_BUCKETS - 1];
    let _ = writeln!(output, "{name}_bucket{{site=\"{site}\",le=\"+Inf\"}} {cumulative}");
    let _ = writeln!(output, "{name}_sum{{site=\"{site}\"}} {sum}");
    let _ = writeln!(output, "{name}_count{{site=\"{site}\"}} {cumulative}");
}

/// Format metrics in Prometheus text exposition format
fn format_prometheus_metrics(ctx: &ApiContext) -> String {
    let summary = ctx.metrics.snapshot();
    let counters = ctx.query.counters();
    let area = ctx.config.area();
    let mut output = String::with_capacity(4096);

    write_occupancy_metrics(&mut output, &ctx.site_id, &counters, &area);
    write_ingest_metrics(&mut output, &ctx.site_id, &summary);
    write_api_metrics(&mut output, &ctx.site_id, &summary);

    output
}

fn write_occupancy_metrics(
    output: &mut String,
    site: &str,
    counters: &CounterSnapshot,
    area: &RegionView,
) {
    write_metric(
        output,
        "region_entries_total",
        "Tracks that entered the region",
        MetricType::Counter,
        site,
        counters.entries,
    );
    write_metric(
        output,
        "region_exits_total",
        "Tracks that exited the region",
        MetricType::Counter,
        site,
        counters.exits,
    );
    write_metric(
        output,
        "region_live_count",
        "Tracks currently counted inside",
        MetricType::Gauge,
        site,
        counters.live,
    );
    write_metric(
        output,
        "region_active",
        "1 when a complete polygon is configured",
        MetricType::Gauge,
        site,
        u64::from(area.state.is_active()),
    );
    write_metric(
        output,
        "region_revision",
        "Region write revision",
        MetricType::Counter,
        site,
        area.revision,
    );
}

fn write_ingest_metrics(output: &mut String, site: &str, summary: &MetricsSummary) {
    write_metric(
        output,
        "region_frames_total",
        "Frames applied by the tracker",
        MetricType::Counter,
        site,
        summary.frames_total,
    );
    write_metric(
        output,
        "region_frames_received_total",
        "Frames handed to the ingestion channel",
        MetricType::Counter,
        site,
        summary.frames_received,
    );
    write_metric(
        output,
        "region_frames_dropped_total",
        "Frames dropped because the ingestion channel was full",
        MetricType::Counter,
        site,
        summary.frames_dropped,
    );
    write_metric(
        output,
        "region_frames_malformed_total",
        "Payloads that failed to parse as a frame",
        MetricType::Counter,
        site,
        summary.frames_malformed,
    );
    write_metric(
        output,
        "region_detections_accepted_total",
        "Detections classified against the region",
        MetricType::Counter,
        site,
        summary.detections_accepted,
    );
    write_metric(
        output,
        "region_detections_ignored_total",
        "Detections filtered out or duplicated within a frame",
        MetricType::Counter,
        site,
        summary.detections_ignored,
    );
    write_metric(
        output,
        "region_tracked_entities",
        "Track ids retained by the tracker",
        MetricType::Gauge,
        site,
        summary.tracked_entities,
    );
    write_histogram(
        output,
        "region_frame_latency_us",
        "Frame latency from receipt to applied, in microseconds",
        site,
        &summary.lat_buckets,
        summary.lat_sum_us,
    );
}

fn write_api_metrics(output: &mut String, site: &str, summary: &MetricsSummary) {
    write_metric(
        output,
        "region_writes_total",
        "Successful region writes",
        MetricType::Counter,
        site,
        summary.region_writes,
    );
    write_metric(
        output,
        "region_writes_rejected_total",
        "Rejected region writes",
        MetricType::Counter,
        site,
        summary.region_rejected,
    );
    write_metric(
        output,
        "region_http_requests_total",
        "HTTP requests served",
        MetricType::Counter,
        site,
        summary.http_requests,
    );
}

fn json_response<T: Serialize>(status: StatusCode, value: &T) -> Response<Full<Bytes>> {
    match serde_json::to_vec(value) {
        Ok(body) => Response::builder()
            .status(status)
            .header("Content-Type", "application/json")
            .header("Access-Control-Allow-Origin", "*")
            .body(Full::new(Bytes::from(body)))
            .expect("static response should not fail"),
        Err(e) => {
            error!(error = %e, "response_serialize_failed");
            text_response(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
        }
    }
}

fn text_response(status: StatusCode, body: &'static str) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .body(Full::new(Bytes::from(body)))
        .expect("static response should not fail")
}

fn bad_request(detail: &str) -> Response<Full<Bytes>> {
    json_response(StatusCode::BAD_REQUEST, &ErrorBody { error: "bad_request", detail })
}

fn invalid_configuration(err: &OccupancyError) -> Response<Full<Bytes>> {
    let OccupancyError::InvalidConfiguration(detail) = err;
    json_response(
        StatusCode::UNPROCESSABLE_ENTITY,
        &ErrorBody { error: "invalid_configuration", detail },
    )
}

/// Parse `since=<n>` from a query string
fn since_offset(query: Option<&str>) -> Option<usize> {
    query?
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| *key == "since")
        .and_then(|(_, value)| value.parse().ok())
}

/// Route one request
pub fn route(
    method: &Method,
    path: &str,
    query: Option<&str>,
    body: &[u8],
    ctx: &ApiContext,
) -> Response<Full<Bytes>> {
    ctx.metrics.record_http_request();

    match (method, path) {
        (&Method::GET, "/api/stats/" | "/api/stats") => {
            let events = match since_offset(query) {
                Some(offset) => ctx.query.history_since(offset),
                None => ctx.query.history(),
            };
            json_response(StatusCode::OK, &events)
        }
        (&Method::GET, "/api/stats/live") => {
            json_response(StatusCode::OK, &serde_json::json!({ "live_count": ctx.query.live_count() }))
        }
        (&Method::GET, "/api/stats/counters") => json_response(StatusCode::OK, &ctx.query.counters()),
        (&Method::GET, "/api/config/area") => {
            let view = ctx.config.area();
            json_response(StatusCode::OK, &AreaView::new(&view, None))
        }
        (&Method::POST, "/api/config/area") => {
            let request: AreaRequest = match serde_json::from_slice(body) {
                Ok(request) => request,
                Err(e) => return bad_request(&e.to_string()),
            };
            match ctx.config.set_area(&request.points) {
                Ok(view) => json_response(
                    StatusCode::OK,
                    &serde_json::json!({
                        "message": "Area configuration updated successfully",
                        "new_area": &*view.state,
                    }),
                ),
                Err(e) => invalid_configuration(&e),
            }
        }
        (&Method::DELETE, "/api/config/area") => {
            let view = ctx.config.reset();
            json_response(StatusCode::OK, &AreaView::new(&view, None))
        }
        (&Method::POST, "/api/config/area/point") => {
            let request: PointRequest = match serde_json::from_slice(body) {
                Ok(request) => request,
                Err(e) => return bad_request(&e.to_string()),
            };
            match ctx.config.add_point(request.x, request.y) {
                Ok((outcome, view)) => {
                    json_response(StatusCode::OK, &AreaView::new(&view, Some(outcome)))
                }
                Err(e) => invalid_configuration(&e),
            }
        }
        (&Method::OPTIONS, p) if p.starts_with("/api/") => Response::builder()
            .status(StatusCode::NO_CONTENT)
            .header("Access-Control-Allow-Origin", "*")
            .header("Access-Control-Allow-Methods", "GET, POST, DELETE, OPTIONS")
            .header("Access-Control-Allow-Headers", "Content-Type")
            .body(Full::new(Bytes::new()))
            .expect("static response should not fail"),
        (&Method::GET, "/metrics") => Response::builder()
            .status(StatusCode::OK)
            .header("Content-Type", "text/plain; version=0.0.4; charset=utf-8")
            .body(Full::new(Bytes::from(format_prometheus_metrics(ctx))))
            .expect("static response should not fail"),
        (&Method::GET, "/health") => text_response(StatusCode::OK, "ok"),
        _ => text_response(StatusCode::NOT_FOUND, "Not Found"),
    }
}

/// Handle HTTP requests
async fn handle_request(
    req: Request<hyper::body::Incoming>,
    ctx: ApiContext,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let (parts, body) = req.into_parts();

    let body = match Limited::new(body, MAX_BODY_BYTES).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) if e.is::<LengthLimitError>() => {
            return Ok(text_response(StatusCode::PAYLOAD_TOO_LARGE, "Payload Too Large"));
        }
        Err(e) => {
            debug!(error = %e, "request_body_read_failed");
            return Ok(text_response(StatusCode::BAD_REQUEST, "Bad Request"));
        }
    };

    let response = route(&parts.method, parts.uri.path(), parts.uri.query(), &body, &ctx);
    debug!(method = %parts.method, path = %parts.uri.path(), status = %response.status().as_u16(), "http_request");
    Ok(response)
}

/// Start the HTTP API server
pub async fn start_api_server(
    bind_address: &str,
    port: u16,
    ctx: ApiContext,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let listener = TcpListener::bind((bind_address, port)).await?;

    info!(addr = %listener.local_addr()?, site = %ctx.site_id, "api_server_started");

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, _addr)) => {
                        let io = TokioIo::new(stream);
                        let ctx = ctx.clone();

                        tokio::spawn(async move {
                            let service = service_fn(move |req| {
                                let ctx = ctx.clone();
                                async move { handle_request(req, ctx).await }
                            });

                            if let Err(e) = http1::Builder::new()
                                .serve_connection(io, service)
                                .await
                            {
                                error!(error = %e, "api_http_error");
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "api_accept_error");
                    }
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("api_server_shutdown");
                    return Ok(());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::event::{EventKind, OccupancyEvent};
    use crate::domain::types::TrackId;
    use crate::services::state::OccupancyState;

    fn context() -> ApiContext {
        let state = Arc::new(OccupancyState::default());
        let metrics = Arc::new(Metrics::new());
        ApiContext {
            query: QueryService::new(state.clone()),
            config: ConfigService::new(state, None, metrics.clone()),
            metrics,
            site_id: Arc::from("test"),
        }
    }

    fn call(ctx: &ApiContext, method: Method, path: &str, body: &str) -> (StatusCode, String) {
        let (path, query) = match path.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (path, None),
        };
        let response = route(&method, path, query, body.as_bytes(), ctx);
        let status = response.status();
        let bytes = body_bytes(response);
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    fn body_bytes(response: Response<Full<Bytes>>) -> Bytes {
        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        rt.block_on(async { response.into_body().collect().await.unwrap().to_bytes() })
    }

    fn json(body: &str) -> serde_json::Value {
        serde_json::from_str(body).unwrap()
    }

    const SQUARE: &str = r#"{"points": [[0, 0], [10, 0], [10, 10], [0, 10]]}"#;

    #[test]
    fn test_set_area_success_message() {
        let ctx = context();
        let (status, body) = call(&ctx, Method::POST, "/api/config/area", SQUARE);
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            json(&body),
            serde_json::json!({
                "message": "Area configuration updated successfully",
                "new_area": [[0, 0], [10, 0], [10, 10], [0, 10]]
            })
        );

        let (_, body) = call(&ctx, Method::GET, "/api/config/area", "");
        assert_eq!(
            json(&body),
            serde_json::json!({"status": "active", "points": [[0, 0], [10, 0], [10, 10], [0, 10]], "revision": 1})
        );
    }

    #[test]
    fn test_set_area_wrong_shape_is_422() {
        let ctx = context();
        call(&ctx, Method::POST, "/api/config/area", SQUARE);

        let (status, body) =
            call(&ctx, Method::POST, "/api/config/area", r#"{"points": [[0, 0], [1, 0], [1, 1]]}"#);
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(json(&body)["error"], "invalid_configuration");

        let (_, body) = call(&ctx, Method::GET, "/api/config/area", "");
        assert_eq!(json(&body)["revision"], 1);
    }

    #[test]
    fn test_set_area_bad_json_is_400() {
        let ctx = context();
        let (status, _) = call(&ctx, Method::POST, "/api/config/area", "{not json");
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = call(&ctx, Method::POST, "/api/config/area", r#"{"area": []}"#);
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_interactive_point_and_reset() {
        let ctx = context();
        let (status, body) =
            call(&ctx, Method::POST, "/api/config/area/point", r#"{"x": 3, "y": 4}"#);
        assert_eq!(status, StatusCode::OK);
        let body = json(&body);
        assert_eq!(body["status"], "pending");
        assert_eq!(body["outcome"], "added");
        assert_eq!(body["points"], serde_json::json!([[3, 4]]));

        let (status, body) = call(&ctx, Method::DELETE, "/api/config/area", "");
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json(&body)["points"], serde_json::json!([]));
        assert_eq!(json(&body)["revision"], 2);
    }

    #[test]
    fn test_stats_routes() {
        let ctx = context();
        let (status, body) = call(&ctx, Method::GET, "/api/stats/live", "");
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json(&body), serde_json::json!({"live_count": 0}));

        let (_, body) = call(&ctx, Method::GET, "/api/stats/", "");
        assert_eq!(json(&body), serde_json::json!([]));
        let (status, _) = call(&ctx, Method::GET, "/api/stats", "");
        assert_eq!(status, StatusCode::OK);

        let (_, body) = call(&ctx, Method::GET, "/api/stats/counters", "");
        assert_eq!(json(&body), serde_json::json!({"entries": 0, "exits": 0, "live_count": 0}));
    }

    #[test]
    fn test_history_since_query() {
        let state = Arc::new(OccupancyState::default());
        for track in 0..3 {
            state.history.append(OccupancyEvent::new(
                TrackId(track),
                EventKind::Entered,
                state.region.get(),
            ));
        }
        let metrics = Arc::new(Metrics::new());
        let ctx = ApiContext {
            query: QueryService::new(state.clone()),
            config: ConfigService::new(state, None, metrics.clone()),
            metrics,
            site_id: Arc::from("test"),
        };

        let (_, body) = call(&ctx, Method::GET, "/api/stats/?since=2", "");
        let events = json(&body);
        assert_eq!(events.as_array().unwrap().len(), 1);
        assert_eq!(events[0]["track_id"], 2);
        assert_eq!(events[0]["event"], "entered");
    }

    #[test]
    fn test_since_offset_parsing() {
        assert_eq!(since_offset(None), None);
        assert_eq!(since_offset(Some("since=5")), Some(5));
        assert_eq!(since_offset(Some("a=1&since=7")), Some(7));
        assert_eq!(since_offset(Some("since=x")), None);
    }

    #[test]
    fn test_metrics_and_health() {
        let ctx = context();
        call(&ctx, Method::POST, "/api/config/area", SQUARE);

        let (status, body) = call(&ctx, Method::GET, "/metrics", "");
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("region_live_count{site=\"test\"} 0"));
        assert!(body.contains("region_active{site=\"test\"} 1"));
        assert!(body.contains("region_writes_total{site=\"test\"} 1"));
        assert!(body.contains("region_frame_latency_us_bucket{site=\"test\",le=\"+Inf\"} 0"));

        let (status, body) = call(&ctx, Method::GET, "/health", "");
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "ok");

        let (status, _) = call(&ctx, Method::GET, "/nope", "");
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(ctx.metrics.snapshot().http_requests, 4);
    }
}
