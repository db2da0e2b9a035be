/// Path prefix of the AR entry route, `/ar/:id`
pub const AR_ROUTE_PREFIX: &str = "/ar/";

/// Path prefix of the non-AR walkthrough, `/qrcodes/simulate/:id`
pub const SIMULATE_ROUTE_PREFIX: &str = "/qrcodes/simulate/";

/// Short-code prefix of preview payloads printed before a code exists
pub const PREVIEW_PREFIX: &str = "preview-";

/// A route the scan core hands off to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Ar(String),
    Simulate(String),
}

pub fn ar_route(code_id: &str) -> String {
    format!("{}{}", AR_ROUTE_PREFIX, code_id)
}

pub fn simulate_route(code_id: &str) -> String {
    format!("{}{}", SIMULATE_ROUTE_PREFIX, code_id)
}

/// The payload printed into a code: `<base>/ar/<id>`
pub fn ar_url(base_url: &str, code_id: &str) -> String {
    format!("{}{}", base_url.trim_end_matches('/'), ar_route(code_id))
}

/// Payload for previewing a video before its code is generated
pub fn preview_payload(base_url: &str, video_id: &str) -> String {
    ar_url(base_url, &format!("{}{}", PREVIEW_PREFIX, video_id))
}

/// Parse an app path (query and fragment ignored) into a known route
pub fn parse_route(path: &str) -> Option<Route> {
    let path = path.split(['?', '#']).next().unwrap_or_default();
    let id_after = |prefix: &str| {
        path.strip_prefix(prefix)
            .map(|rest| rest.trim_end_matches('/'))
            .filter(|id| !id.is_empty() && !id.contains('/'))
            .map(str::to_string)
    };

    if let Some(id) = id_after(SIMULATE_ROUTE_PREFIX) {
        return Some(Route::Simulate(id));
    }
    id_after(AR_ROUTE_PREFIX).map(Route::Ar)
}
