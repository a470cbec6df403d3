use askama::Template;
use askama_web::WebTemplate;

/// One row of the status page.
pub struct VehicleRow {
    pub label: String,
    pub route: String,
    pub last_seen: String,
    pub progress: String,
    pub next_stop: String,
    pub low_confidence: bool,
}

#[derive(Template, WebTemplate)]
#[template(path = "dashboard.html")]
pub struct DashboardTemplate {
    pub generated_at: String,
    pub route_count: usize,
    pub driver_count: usize,
    pub subscriber_count: usize,
    pub vehicles: Vec<VehicleRow>,
}
