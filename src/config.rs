use std::time::Duration;

/// Folder holding the image-completed template decks, one subfolder per customer.
pub const TEMPLATE_DIR: &str = "/root/Report/completed_with_images";
/// Folder the finished decks are written to, mirroring the template tree.
pub const OUTPUT_DIR: &str = "/root/Report/completed_final";

pub const GRAFANA_URL_ENV: &str = "GRAFANA_URL";
pub const GRAFANA_API_KEY_ENV: &str = "GRAFANA_API_KEY";
pub const DEFAULT_GRAFANA_URL: &str = "http://localhost:3000";

/// Customer folder name → Grafana dashboard UID.
pub const DASHBOARD_MAP: &[(&str, &str)] = &[
    ("kpmo", "dejkgjz0jnoqoa"),
    ("GIT", "aejkgkoze5nggb"),
    ("hansystem", "cejnb5yyuk5q8e"),
    ("humecca", "bejnb5db19blse"),
    ("klcns", "eejnb31cylreod"),
    ("sungwoo", "cejnb4aafury8e"),
    ("thepnl", "fejkgid897xtsc"),
    ("프리스타일", "fejkgfwux1fy8c"),
];

/// Sentence inserted for each resolved metric placeholder.
pub const SENTENCE_TEMPLATE: &str = "사용량 최대 {max}%, 평균 {mean}% 입니다.";

pub const DASHBOARD_FETCH_ATTEMPTS: u32 = 3;
pub const DASHBOARD_FETCH_RETRY_DELAY: Duration = Duration::from_secs(1);
pub const DASHBOARD_FETCH_TIMEOUT: Duration = Duration::from_secs(20);
/// Query execution covers a whole month of points; give Grafana room to aggregate.
pub const QUERY_TIMEOUT: Duration = Duration::from_secs(120);
/// Pause between consecutive ad-hoc queries so a run does not hammer Grafana.
pub const QUERY_PAUSE: Duration = Duration::from_secs(1);

pub fn dashboard_uid(customer: &str) -> Option<&'static str> {
    DASHBOARD_MAP
        .iter()
        .find(|(name, _)| *name == customer)
        .map(|(_, uid)| *uid)
}
