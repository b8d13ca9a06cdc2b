//! CSS selectors and extractors for platform pages

use lazy_static::lazy_static;
use scraper::{ElementRef, Html, Selector};

use crate::models::RouteRecord;
use crate::utils::error::FetchError;
use crate::utils::{normalize_whitespace, parse_first_decimal, parse_first_integer};

macro_rules! parse_selector {
    ($s:expr) => {
        Selector::parse($s).expect(concat!("Invalid CSS selector: ", $s))
    };
}

lazy_static! {
    static ref USER_KARMA: Selector = parse_selector!("div.karma");
    static ref PARTICIPANTS_CONTAINER: Selector = parse_selector!("#id_participants_list_container");
    static ref PARTICIPANT_LINK: Selector = parse_selector!("a[href]");
    static ref ROUTE_STATISTICS: Selector = parse_selector!(".map-statistics");
    static ref TABLE_ROW: Selector = parse_selector!("tr");
    static ref TABLE_HEADER: Selector = parse_selector!("th");
    static ref TABLE_CELL: Selector = parse_selector!("td");
    static ref ROUTE_TITLE: Selector = parse_selector!("h1");
    static ref CSRF_INPUT: Selector = parse_selector!("input[name='csrfmiddlewaretoken']");
}

fn text_of(element: ElementRef<'_>) -> String {
    normalize_whitespace(&element.text().collect::<String>())
}

/// Rating points shown on a user's profile page
pub fn parse_user_points(html: &str) -> Result<i64, FetchError> {
    let document = Html::parse_document(html);
    let karma = document
        .select(&USER_KARMA)
        .next()
        .ok_or_else(|| FetchError::parse("user points", "karma element missing"))?;

    let text = text_of(karma);
    parse_first_integer(&text)
        .ok_or_else(|| FetchError::parse("user points", format!("no number in {text:?}")))
}

/// Participant ids linked from an event page, deduplicated in page order
pub fn parse_participant_ids(html: &str) -> Result<Vec<i64>, FetchError> {
    let document = Html::parse_document(html);
    let container = document
        .select(&PARTICIPANTS_CONTAINER)
        .next()
        .ok_or_else(|| FetchError::parse("participants", "participant list missing"))?;

    let mut ids = Vec::new();
    for link in container.select(&PARTICIPANT_LINK) {
        let Some(id) = link.value().attr("href").and_then(id_from_href) else {
            continue;
        };
        if !ids.contains(&id) {
            ids.push(id);
        }
    }
    Ok(ids)
}

/// Last numeric path segment of a link, e.g. `/routes/user/42/` gives 42
fn id_from_href(href: &str) -> Option<i64> {
    let path = href.split(['?', '#']).next().unwrap_or(href);
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .and_then(|segment| segment.parse().ok())
}

/// Route metadata from a route detail page
pub fn parse_route_details(id: i64, html: &str) -> Result<RouteRecord, FetchError> {
    let document = Html::parse_document(html);
    let statistics = document
        .select(&ROUTE_STATISTICS)
        .next()
        .ok_or_else(|| FetchError::parse("route details", "statistics table missing"))?;

    let mut route = RouteRecord {
        id,
        title: document
            .select(&ROUTE_TITLE)
            .next()
            .map(text_of)
            .unwrap_or_default(),
        elevation: 0,
        distance: 0.0,
        scale: String::new(),
        rating_points: None,
    };

    for row in statistics.select(&TABLE_ROW) {
        let Some(header) = row.select(&TABLE_HEADER).next().map(text_of) else {
            continue;
        };
        let Some(value) = row.select(&TABLE_CELL).last().map(text_of) else {
            continue;
        };
        let header = header.to_lowercase();

        if header.contains("rating") {
            route.rating_points = parse_first_integer(&value);
        } else if header.contains("elevation") {
            route.elevation = parse_first_integer(&value).unwrap_or_default();
        } else if header.contains("distance") {
            route.distance = parse_first_decimal(&value).unwrap_or_default();
        } else if header.contains("scale") || header.contains("sac") || header.contains("difficulty") {
            route.scale = value;
        }
    }

    Ok(route)
}

/// CSRF token embedded in the login form
pub fn parse_csrf_token(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    document
        .select(&CSRF_INPUT)
        .next()
        .and_then(|input| input.value().attr("value"))
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_user_points() {
        let html = r#"<html><body><div class="profile"><div class="karma">
            120 <span>points</span></div></div></body></html>"#;
        assert_eq!(parse_user_points(html).unwrap(), 120);
    }

    #[test]
    fn test_parse_user_points_missing() {
        let err = parse_user_points("<html><body>Log in</body></html>").unwrap_err();
        assert!(matches!(err, FetchError::Parse { .. }));
    }

    #[test]
    fn test_parse_participant_ids_dedups() {
        let html = r#"
            <div id="id_participants_list_container">
                <a href="/routes/user/7/">Ann</a>
                <a href="/routes/user/8/">Ben</a>
                <a href="/routes/user/7/">Ann again</a>
                <a href="/routes/user/profile/">not a user</a>
                <a>no link</a>
            </div>
            <a href="/routes/user/99/">organizer outside list</a>
        "#;
        assert_eq!(parse_participant_ids(html).unwrap(), vec![7, 8]);
    }

    #[test]
    fn test_parse_participant_ids_empty_list() {
        let html = r#"<div id="id_participants_list_container"></div>"#;
        assert!(parse_participant_ids(html).unwrap().is_empty());
    }

    #[test]
    fn test_id_from_href() {
        assert_eq!(id_from_href("/routes/user/42/"), Some(42));
        assert_eq!(id_from_href("/routes/user/42"), Some(42));
        assert_eq!(id_from_href("/routes/user/42/?tab=events"), Some(42));
        assert_eq!(id_from_href("/routes/user/"), None);
    }

    #[test]
    fn test_parse_route_details() {
        let html = r#"
            <h1> Monte   Generoso </h1>
            <table class="map-statistics">
                <tr><th>Distance</th><td>12,5 km</td></tr>
                <tr><th>Elevation gain</th><td>icon</td><td>1350 m</td></tr>
                <tr><th>SAC scale</th><td>T3</td></tr>
                <tr><th>Rating</th><td>x</td><td>300</td></tr>
            </table>
        "#;
        let route = parse_route_details(55, html).unwrap();
        assert_eq!(route.id, 55);
        assert_eq!(route.title, "Monte Generoso");
        assert_eq!(route.distance, 12.5);
        assert_eq!(route.elevation, 1350);
        assert_eq!(route.scale, "T3");
        assert_eq!(route.rating_points, Some(300));
    }

    #[test]
    fn test_parse_route_details_without_rating() {
        let html = r#"<table class="map-statistics"><tr><th>Distance</th><td>3 km</td></tr></table>"#;
        let route = parse_route_details(1, html).unwrap();
        assert_eq!(route.rating_points, None);
        assert_eq!(route.distance, 3.0);
    }

    #[test]
    fn test_parse_csrf_token() {
        let html = r#"<form><input type="hidden" name="csrfmiddlewaretoken" value="abc123"></form>"#;
        assert_eq!(parse_csrf_token(html), Some("abc123".to_string()));
        assert_eq!(parse_csrf_token("<form></form>"), None);
    }
}
