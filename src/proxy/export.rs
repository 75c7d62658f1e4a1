//! Text serializations of working proxies
//!
//! Every format preserves input order. Missing values are rendered per
//! format: `N/A` for latency and check time in the text formats, `Unknown`
//! for geo fields, and an empty cell for numeric and time columns in CSV.

use crate::proxy::geo::GeoInfo;
use crate::proxy::models::ProxyRecord;
use chrono::{DateTime, SecondsFormat, Utc};
use std::fmt;
use std::str::FromStr;

const UNKNOWN: &str = "Unknown";
const NOT_AVAILABLE: &str = "N/A";

/// Rule drawn around each proxy in the enhanced format
const RULE_WIDTH: usize = 78;

const CSV_HEADER: [&str; 23] = [
    "IP",
    "Port",
    "Type",
    "Country",
    "Country_Code",
    "Region",
    "City",
    "Postal_Code",
    "Latitude",
    "Longitude",
    "Timezone",
    "ISP",
    "Organization",
    "AS_Number",
    "AS_Name",
    "Mobile",
    "Hosting",
    "Proxy_Detected",
    "Response_Time_ms",
    "Last_Checked",
    "Username",
    "Password",
    "Original_Format",
];

/// Available export serializations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportKind {
    /// HOST:PORT per line
    Simple,
    /// The source lines as loaded
    Original,
    /// One pipe-delimited line per proxy
    Detailed,
    /// A human-readable block with every geo field
    #[default]
    Enhanced,
    /// 23-column CSV
    Csv,
}

impl ExportKind {
    pub const ALL: [ExportKind; 5] = [
        ExportKind::Simple,
        ExportKind::Original,
        ExportKind::Detailed,
        ExportKind::Enhanced,
        ExportKind::Csv,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ExportKind::Simple => "simple",
            ExportKind::Original => "original",
            ExportKind::Detailed => "detailed",
            ExportKind::Enhanced => "enhanced",
            ExportKind::Csv => "csv",
        }
    }

    /// Human-readable label for status messages
    pub fn description(&self) -> &'static str {
        match self {
            ExportKind::Simple => "IP:PORT Only",
            ExportKind::Original => "Original Format",
            ExportKind::Detailed => "Detailed Information",
            ExportKind::Enhanced => "Enhanced Info (with IP details)",
            ExportKind::Csv => "CSV Format",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            ExportKind::Csv => "text/csv",
            _ => "text/plain",
        }
    }

    /// File name stamped with the export time, e.g.
    /// `working_proxies_simple_2024-05-01T12-30-00.txt`
    pub fn file_name(&self, at: DateTime<Utc>) -> String {
        let stamp = at.format("%Y-%m-%dT%H-%M-%S");
        match self {
            ExportKind::Csv => format!("working_proxies_{}.csv", stamp),
            kind => format!("working_proxies_{}_{}.txt", kind.name(), stamp),
        }
    }
}

impl fmt::Display for ExportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ExportKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| {
                format!(
                    "Invalid export format: {}. Use: simple, original, detailed, enhanced, csv",
                    s
                )
            })
    }
}

/// Renders working proxies; headers carry the generation time
#[derive(Debug, Clone, Copy)]
pub struct ExportFormatter {
    generated_at: DateTime<Utc>,
}

impl Default for ExportFormatter {
    fn default() -> Self {
        Self::new()
    }
}

impl ExportFormatter {
    /// Formatter stamped with the current time
    pub fn new() -> Self {
        Self::at(Utc::now())
    }

    /// Formatter stamped with a fixed time
    pub fn at(generated_at: DateTime<Utc>) -> Self {
        Self { generated_at }
    }

    pub fn generated_at(&self) -> DateTime<Utc> {
        self.generated_at
    }

    /// Render `records`, which the caller has already narrowed to working ones
    pub fn format(&self, records: &[ProxyRecord], kind: ExportKind) -> String {
        match kind {
            ExportKind::Simple => self.simple(records),
            ExportKind::Original => self.original(records),
            ExportKind::Detailed => self.detailed(records),
            ExportKind::Enhanced => self.enhanced(records),
            ExportKind::Csv => csv(records),
        }
    }

    fn stamp(&self) -> String {
        text_time(&self.generated_at)
    }

    fn simple(&self, records: &[ProxyRecord]) -> String {
        let header = format!(
            "# Working Proxies Export - Simple Format (IP:PORT)\n# Generated: {}\n\n",
            self.stamp()
        );
        let body: Vec<String> = records
            .iter()
            .map(|record| record.address.to_simple_string())
            .collect();
        header + &body.join("\n")
    }

    fn original(&self, records: &[ProxyRecord]) -> String {
        let header = format!(
            "# Working Proxies Export - Original Format\n# Generated: {}\n\n",
            self.stamp()
        );
        let body: Vec<&str> = records
            .iter()
            .map(|record| record.original_text.as_str())
            .collect();
        header + &body.join("\n")
    }

    fn detailed(&self, records: &[ProxyRecord]) -> String {
        let header = format!(
            "# Working Proxies Export - Detailed Format\n\
             # Format: IP:PORT | Type | Country | Response Time | Last Checked | Auth (if available)\n\
             # Generated: {}\n\n",
            self.stamp()
        );
        let body: Vec<String> = records
            .iter()
            .map(|record| {
                let mut line = format!(
                    "{} | {} | {} | {} | {}",
                    record.address.to_simple_string(),
                    record.proxy_type,
                    record.country().unwrap_or(UNKNOWN),
                    text_latency(record),
                    text_checked(record),
                );
                if let Some(auth) = record.address.auth.as_ref().filter(|a| a.is_complete()) {
                    line.push_str(&format!(" | Auth: {}:{}", auth.username, auth.password));
                }
                line
            })
            .collect();
        header + &body.join("\n")
    }

    fn enhanced(&self, records: &[ProxyRecord]) -> String {
        let mut out = format!(
            "# Working Proxies Export - Enhanced Format with IP Details\n\
             # Generated: {}\n\
             # Format: Each proxy includes detailed geolocation and ISP information\n\n",
            self.stamp()
        );
        let rule = "━".repeat(RULE_WIDTH);
        let empty = GeoInfo::default();

        for record in records {
            let geo = record.geo.as_ref().unwrap_or(&empty);
            let text = |value: &Option<String>| value.clone().unwrap_or_else(|| UNKNOWN.to_string());
            let number = |value: Option<f64>| value.map_or_else(|| UNKNOWN.to_string(), |v| v.to_string());
            let yes_no = |flag: bool| if flag { "Yes" } else { "No" };

            out.push_str(&format!("{rule}\nPROXY: {}\n{rule}\n", record.address));
            out.push_str(&format!(
                "  Location: {}, {}, {} ({})\n",
                text(&geo.city),
                text(&geo.region),
                text(&geo.country),
                text(&geo.country_code)
            ));
            out.push_str(&format!("  ISP: {}\n", text(&geo.isp)));
            out.push_str(&format!("  Organization: {}\n", text(&geo.org)));
            out.push_str(&format!("  AS Number: {}\n", text(&geo.as_number)));
            out.push_str(&format!("  AS Name: {}\n", text(&geo.as_name)));
            out.push_str(&format!("  Coordinates: {}, {}\n", number(geo.lat), number(geo.lon)));
            out.push_str(&format!("  Timezone: {}\n", text(&geo.timezone)));
            out.push_str(&format!("  Postal Code: {}\n", text(&geo.postal_code)));
            out.push_str(&format!("  Proxy Type: {}\n", record.proxy_type));
            out.push_str(&format!("  Response Time: {}\n", text_latency(record)));
            out.push_str(&format!("  Mobile: {}\n", yes_no(geo.mobile)));
            out.push_str(&format!("  Hosting/VPN: {}\n", yes_no(geo.hosting)));
            out.push_str(&format!(
                "  Proxy Detection: {}\n",
                if geo.proxy_detected { "Detected" } else { "Not Detected" }
            ));
            out.push_str(&format!("  Last Checked: {}\n", text_checked(record)));
            if let Some(auth) = record.address.auth.as_ref().filter(|a| a.is_complete()) {
                out.push_str(&format!("  Authentication: {}:{}\n", auth.username, auth.password));
            }
            out.push_str(&format!("  Original Format: {}\n\n", record.original_text));
        }

        out
    }
}

fn text_time(at: &DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

fn text_latency(record: &ProxyRecord) -> String {
    record
        .latency_ms
        .map_or_else(|| NOT_AVAILABLE.to_string(), |ms| format!("{}ms", ms))
}

fn text_checked(record: &ProxyRecord) -> String {
    record
        .last_checked_at
        .as_ref()
        .map_or_else(|| NOT_AVAILABLE.to_string(), text_time)
}

/// Replace the characters that would shift CSV columns
fn sanitize(value: &str) -> String {
    value.replace([',', '"'], ";")
}

fn csv(records: &[ProxyRecord]) -> String {
    let mut lines = vec![CSV_HEADER.join(",")];
    let empty = GeoInfo::default();

    for record in records {
        let geo = record.geo.as_ref().unwrap_or(&empty);
        let text = |value: &Option<String>| sanitize(value.as_deref().unwrap_or(UNKNOWN));
        let number = |value: Option<f64>| value.map_or_else(|| UNKNOWN.to_string(), |v| v.to_string());
        let yes_no = |flag: bool| String::from(if flag { "Yes" } else { "No" });

        let row = [
            sanitize(&record.address.host),
            record.address.port.to_string(),
            record.proxy_type.to_string(),
            text(&geo.country),
            text(&geo.country_code),
            text(&geo.region),
            text(&geo.city),
            text(&geo.postal_code),
            number(geo.lat),
            number(geo.lon),
            text(&geo.timezone),
            text(&geo.isp),
            text(&geo.org),
            text(&geo.as_number),
            text(&geo.as_name),
            yes_no(geo.mobile),
            yes_no(geo.hosting),
            yes_no(geo.proxy_detected),
            record.latency_ms.map(|ms| ms.to_string()).unwrap_or_default(),
            record
                .last_checked_at
                .map(|at| at.to_rfc3339_opts(SecondsFormat::Millis, true))
                .unwrap_or_default(),
            sanitize(record.address.username().unwrap_or_default()),
            sanitize(record.address.password().unwrap_or_default()),
            sanitize(&record.original_text),
        ];
        lines.push(row.join(","));
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::models::{ProxyAddress, ProxyStatus, ProxyType};
    use chrono::TimeZone;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap()
    }

    fn working(id: usize, address: ProxyAddress, original: &str) -> ProxyRecord {
        let mut record = ProxyRecord::new(id, address, ProxyType::Http, original.to_string());
        record.status = ProxyStatus::Working;
        record.latency_ms = Some(120);
        record.last_checked_at = Some(at());
        record
    }

    fn sample() -> Vec<ProxyRecord> {
        let mut first = working(
            0,
            ProxyAddress::new("1.2.3.4".to_string(), 8080),
            "http://1.2.3.4:8080",
        );
        first.geo = Some(GeoInfo {
            country: Some("Germany".to_string()),
            country_code: Some("DE".to_string()),
            isp: Some("Acme, Inc".to_string()),
            lat: Some(50.5),
            hosting: true,
            ..Default::default()
        });

        let mut second = working(
            1,
            ProxyAddress::with_auth(
                "5.6.7.8".to_string(),
                3128,
                "user".to_string(),
                "pass".to_string(),
            ),
            "user:pass@5.6.7.8:3128",
        );
        second.proxy_type = ProxyType::Socks5;
        second.latency_ms = None;
        second.last_checked_at = None;

        vec![first, second]
    }

    #[test]
    fn test_export_kind_names() {
        assert_eq!("CSV".parse::<ExportKind>(), Ok(ExportKind::Csv));
        assert!("xml".parse::<ExportKind>().is_err());
        assert_eq!(ExportKind::default(), ExportKind::Enhanced);
        assert_eq!(ExportKind::Csv.mime_type(), "text/csv");
        assert_eq!(ExportKind::Detailed.mime_type(), "text/plain");
    }

    #[test]
    fn test_file_names() {
        assert_eq!(
            ExportKind::Simple.file_name(at()),
            "working_proxies_simple_2024-05-01T12-30-00.txt"
        );
        assert_eq!(
            ExportKind::Csv.file_name(at()),
            "working_proxies_2024-05-01T12-30-00.csv"
        );
    }

    #[test]
    fn test_simple_and_original() {
        let formatter = ExportFormatter::at(at());
        let simple = formatter.format(&sample(), ExportKind::Simple);
        assert!(simple.starts_with("# Working Proxies Export - Simple Format (IP:PORT)\n"));
        assert!(simple.contains("# Generated: 2024-05-01 12:30:00 UTC\n\n"));
        assert!(simple.ends_with("\n\n1.2.3.4:8080\n5.6.7.8:3128"));

        let original = formatter.format(&sample(), ExportKind::Original);
        assert!(original.ends_with("\n\nhttp://1.2.3.4:8080\nuser:pass@5.6.7.8:3128"));
    }

    #[test]
    fn test_detailed_lines() {
        let detailed = ExportFormatter::at(at()).format(&sample(), ExportKind::Detailed);
        let lines: Vec<&str> = detailed.lines().skip(4).collect();
        assert_eq!(
            lines,
            vec![
                "1.2.3.4:8080 | HTTP | Germany | 120ms | 2024-05-01 12:30:00 UTC",
                "5.6.7.8:3128 | SOCKS5 | Unknown | N/A | N/A | Auth: user:pass",
            ]
        );
    }

    #[test]
    fn test_detailed_skips_partial_auth() {
        let record = working(
            0,
            ProxyAddress::with_auth("1.1.1.1".to_string(), 80, "user".to_string(), String::new()),
            "1.1.1.1:80",
        );
        let detailed = ExportFormatter::at(at()).format(&[record], ExportKind::Detailed);
        assert!(!detailed.contains("Auth: user"));
    }

    #[test]
    fn test_enhanced_block() {
        let enhanced = ExportFormatter::at(at()).format(&sample(), ExportKind::Enhanced);
        assert!(enhanced.contains("PROXY: 1.2.3.4:8080\n"));
        assert!(enhanced.contains("  Location: Unknown, Unknown, Germany (DE)\n"));
        assert!(enhanced.contains("  ISP: Acme, Inc\n"));
        assert!(enhanced.contains("  Coordinates: 50.5, Unknown\n"));
        assert!(enhanced.contains("  Hosting/VPN: Yes\n"));
        assert!(enhanced.contains("  Response Time: N/A\n"));
        assert!(enhanced.contains("  Authentication: user:pass\n"));
        assert!(enhanced.contains("  Original Format: user:pass@5.6.7.8:3128\n"));
        assert_eq!(enhanced.matches("PROXY: ").count(), 2);
    }

    #[test]
    fn test_csv_sanitizes_fields() {
        let csv = ExportFormatter::at(at()).format(&sample()[..1], ExportKind::Csv);
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].split(',').count(), 23);

        let cells: Vec<&str> = lines[1].split(',').collect();
        assert_eq!(cells.len(), 23);
        assert_eq!(cells[11], "Acme; Inc");
        assert_eq!(cells[8], "50.5");
        assert_eq!(cells[9], "Unknown");
        assert_eq!(cells[16], "Yes");
        assert_eq!(cells[18], "120");
        assert_eq!(cells[19], "2024-05-01T12:30:00.000Z");
    }

    #[test]
    fn test_csv_empty_numeric_cells() {
        let csv = ExportFormatter::at(at()).format(&sample()[1..], ExportKind::Csv);
        let row: Vec<&str> = csv.lines().nth(1).unwrap().split(',').collect();
        assert_eq!(row.len(), 23);
        assert_eq!(row[3], "Unknown");
        assert_eq!(row[18], "");
        assert_eq!(row[19], "");
        assert_eq!(row[20], "user");
        assert_eq!(row[22], "user:pass@5.6.7.8:3128");
    }
}
