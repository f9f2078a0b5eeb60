//! Scrapers for command and page output
//!
//! Every function here takes the raw text a command or page produced and
//! returns the piece a scenario asserts on. None of them touch the network.

use once_cell::sync::Lazy;
use regex::Regex;

static RESULTS_DIR_RE: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"Results are stored in directory (\S+)").ok());
static SUBMIT_VERSION_RE: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(
        r"^\s*Submit client version:\s(\S+)\s+Submit server version:\s(\S+)\s+Submit distributor version:\s(\S+)\s*$",
    )
    .ok()
});
static EXEC_LINE_RE: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"(?s)\nexec'ing[^\n]+\n(.*)").ok());
static TOOL_PARAMETERS_RE: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"TOOL_PARAMETERS=(\S+)").ok());
static INTEGER_RE: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"\d+").ok());
static SESSION_ROW_RE: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^\s*(\d+)\s+(\S+)(?:\s+(.*))?$").ok());
static CLIENTACTION_RE: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"/usr/bin/clientaction url (\S+)").ok());
static PAGINATION_RE: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"(\d+)\s*-\s*(\d+)\s+of\s+(\d+)").ok());

/// One `=SUBMIT-METRICS=>` line printed by `submit --metrics`
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MetricsRecord {
    pub job: u64,
    pub venue: Option<String>,
    pub status: Option<String>,
    pub cputime: Option<String>,
    pub realtime: Option<String>,
}

impl MetricsRecord {
    /// The closing record carries the venue and timing fields
    pub fn is_summary(&self) -> bool {
        self.venue.is_some() && self.status.is_some()
    }
}

const METRICS_MARKER: &str = "=SUBMIT-METRICS=>";

/// All metrics records in `output`, in order
pub fn submit_metrics(output: &str) -> Vec<MetricsRecord> {
    output
        .lines()
        .filter_map(|line| {
            let rest = line.trim().strip_prefix(METRICS_MARKER)?;
            let mut record = MetricsRecord::default();
            let mut has_job = false;
            for field in rest.split_whitespace() {
                let Some((key, value)) = field.split_once('=') else {
                    continue;
                };
                match key {
                    "job" => {
                        record.job = value.parse().ok()?;
                        has_job = true;
                    }
                    "venue" => record.venue = Some(value.to_string()),
                    "status" => record.status = Some(value.to_string()),
                    "cputime" => record.cputime = Some(value.to_string()),
                    "realtime" => record.realtime = Some(value.to_string()),
                    _ => {}
                }
            }
            has_job.then_some(record)
        })
        .collect()
}

/// `output` with every metrics line removed and the remainder trimmed
pub fn strip_metrics(output: &str) -> String {
    output
        .lines()
        .filter(|line| !line.trim_start().starts_with(METRICS_MARKER))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// True when `output` is a start record and a summary record for the
/// same job, with `expected` printed between them or after them
pub fn metrics_wrap_output(output: &str, expected: &str) -> bool {
    let lines: Vec<&str> = output
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();

    let is_metrics = |l: &str| l.starts_with(METRICS_MARKER);
    let records = submit_metrics(output);
    if records.len() != 2 || records[0].is_summary() || !records[1].is_summary() {
        return false;
    }

    let body: Vec<&str> = lines.iter().copied().filter(|l| !is_metrics(l)).collect();
    if body.join("\n") != expected.trim() {
        return false;
    }

    // start record must come first, the body may sit between or after
    lines.first().map(|l| is_metrics(l)).unwrap_or(false)
}

/// Directory named by "Results are stored in directory X"
pub fn results_directory(output: &str) -> Option<String> {
    RESULTS_DIR_RE
        .as_ref()?
        .captures(output)
        .map(|c| c[1].to_string())
}

/// Versions reported by `submit --version`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitVersions {
    pub client: String,
    pub server: String,
    pub distributor: String,
}

pub fn submit_versions(output: &str) -> Option<SubmitVersions> {
    let caps = SUBMIT_VERSION_RE.as_ref()?.captures(output)?;
    Some(SubmitVersions {
        client: caps[1].to_string(),
        server: caps[2].to_string(),
        distributor: caps[3].to_string(),
    })
}

/// A submit server endpoint from `listenURIs`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenUri {
    pub uri: String,
    pub scheme: String,
    pub host: String,
    pub port: u16,
}

/// Endpoints listed under `[client] listenURIs` in `submit-client.conf`
pub fn listen_uris(config: &str) -> Vec<ListenUri> {
    let mut in_client = false;
    let mut value = None;
    for line in config.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with('[') && trimmed.ends_with(']') {
            in_client = trimmed == "[client]";
            continue;
        }
        if !in_client {
            continue;
        }
        if let Some((key, v)) = trimmed.split_once(['=', ':']) {
            if key.trim() == "listenURIs" {
                value = Some(v.trim().to_string());
            }
        }
    }

    value
        .unwrap_or_default()
        .split(',')
        .filter_map(|uri| {
            let uri = uri.trim();
            let (scheme, netloc) = uri.split_once("://")?;
            let netloc = netloc.split('/').next()?;
            let (host, port) = netloc.rsplit_once(':')?;
            Some(ListenUri {
                uri: uri.to_string(),
                scheme: scheme.to_string(),
                host: host.to_string(),
                port: port.parse().ok()?,
            })
        })
        .collect()
}

/// What the invoked tool printed: the text after the `exec'ing ...` line,
/// with metrics lines removed
pub fn invoked_tool_output(output: &str) -> Option<String> {
    let caps = EXEC_LINE_RE.as_ref()?.captures(output)?;
    Some(strip_metrics(&caps[1]))
}

/// One row of `ps aux`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessRow {
    pub user: String,
    pub pid: u32,
    pub tty: String,
    pub stat: String,
    pub command: String,
}

pub fn ps_rows(output: &str) -> Vec<ProcessRow> {
    output
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let user = fields.next()?.to_string();
            let pid = fields.next()?.parse().ok()?;
            // cpu mem vsz rss
            for _ in 0..4 {
                fields.next()?;
            }
            let tty = fields.next()?.to_string();
            let stat = fields.next()?.to_string();
            // start time
            fields.next()?;
            fields.next()?;
            let command = fields.collect::<Vec<_>>().join(" ");
            if command.is_empty() {
                return None;
            }
            Some(ProcessRow {
                user,
                pid,
                tty,
                stat,
                command,
            })
        })
        .collect()
}

/// The process whose command line is exactly `command`
pub fn find_process<'a>(rows: &'a [ProcessRow], command: &str) -> Option<&'a ProcessRow> {
    rows.iter().find(|r| r.command == command)
}

/// Value of `TOOL_PARAMETERS=` in an environment or process dump
pub fn tool_parameters_path(output: &str) -> Option<String> {
    TOOL_PARAMETERS_RE
        .as_ref()?
        .captures(output)
        .map(|c| c[1].to_string())
}

/// True when `/var/tmp/installed_pkgs` lists `package` as installed
pub fn is_package_installed(listing: &str, package: &str) -> bool {
    let pattern = format!(r"ii  {}(:amd64)?\s[^\n]+\n", regex::escape(package));
    match Regex::new(&pattern) {
        Ok(re) => re.is_match(listing),
        Err(_) => false,
    }
}

/// `checknet` prints `True` when it could connect
pub fn checknet_result(output: &str) -> bool {
    output.trim() == "True"
}

/// First integer in `output`, e.g. the session number from `session create`
pub fn first_integer(output: &str) -> Option<u64> {
    INTEGER_RE.as_ref()?.find(output)?.as_str().parse().ok()
}

/// One row of `session list`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRow {
    pub number: u64,
    pub owner: String,
    pub detail: String,
}

impl SessionRow {
    /// Sessions are titled by the last column of the listing
    pub fn title(&self) -> &str {
        self.detail.split_whitespace().last().unwrap_or("")
    }
}

pub fn session_rows(output: &str) -> Vec<SessionRow> {
    let Some(re) = SESSION_ROW_RE.as_ref() else {
        return Vec::new();
    };
    output
        .lines()
        .filter_map(|line| {
            let caps = re.captures(line.trim_end())?;
            Some(SessionRow {
                number: caps[1].parse().ok()?,
                owner: caps[2].to_string(),
                detail: caps.get(3).map(|m| m.as_str().trim().to_string()).unwrap_or_default(),
            })
        })
        .collect()
}

/// Url tails opened by `clientaction url` in a filexfer log, oldest first
pub fn clientaction_urls(log: &str) -> Vec<String> {
    let Some(re) = CLIENTACTION_RE.as_ref() else {
        return Vec::new();
    };
    re.captures_iter(log).map(|c| c[1].to_string()).collect()
}

/// Counts shown by a pagination footer such as "1 - 20 of 345"
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaginationCounts {
    pub start: u64,
    pub end: u64,
    pub total: u64,
}

pub fn pagination_counts(text: &str) -> Option<PaginationCounts> {
    let caps = PAGINATION_RE.as_ref()?.captures(text)?;
    Some(PaginationCounts {
        start: caps[1].parse().ok()?,
        end: caps[2].parse().ok()?,
        total: caps[3].parse().ok()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    const METRICS_BETWEEN: &str = "=SUBMIT-METRICS=> job=1234\nhello world\n=SUBMIT-METRICS=> job=1234 venue=local status=0 cputime=0.01 realtime=0.05\n";
    const METRICS_AFTER: &str = "=SUBMIT-METRICS=> job=77\n=SUBMIT-METRICS=> job=77 venue=local status=0 cputime=0.01 realtime=0.05\nhello world";

    #[test]
    fn test_submit_metrics_records() {
        let records = submit_metrics(METRICS_BETWEEN);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].job, 1234);
        assert!(!records[0].is_summary());
        assert_eq!(records[1].venue.as_deref(), Some("local"));
        assert_eq!(records[1].realtime.as_deref(), Some("0.05"));
    }

    #[test_case(METRICS_BETWEEN, true ; "output between stanzas")]
    #[test_case(METRICS_AFTER, true ; "output after stanzas")]
    #[test_case("hello world", false ; "no metrics")]
    #[test_case("=SUBMIT-METRICS=> job=1\nbye\n=SUBMIT-METRICS=> job=1 venue=x status=0 cputime=0 realtime=0", false ; "wrong output")]
    fn test_metrics_wrap_output(output: &str, expected: bool) {
        assert_eq!(metrics_wrap_output(output, "hello world"), expected);
    }

    #[test]
    fn test_strip_metrics() {
        assert_eq!(strip_metrics(METRICS_BETWEEN), "hello world");
    }

    #[test]
    fn test_results_directory() {
        let out = "Results are stored in directory /home/u/data/sessions/1/00001\n";
        assert_eq!(
            results_directory(out).as_deref(),
            Some("/home/u/data/sessions/1/00001")
        );
        assert_eq!(results_directory("nothing here"), None);
    }

    #[test]
    fn test_submit_versions() {
        let out = "Submit client version: 2.4.2\nSubmit server version: 2.4.2\nSubmit distributor version: 2.4.3";
        let v = submit_versions(out).unwrap();
        assert_eq!(v.client, "2.4.2");
        assert_eq!(v.distributor, "2.4.3");
        assert!(submit_versions("Submit client version: 2.4.2").is_none());
    }

    #[test]
    fn test_listen_uris() {
        let conf = "[server]\nlistenURIs = tcp://other:1\n\n[client]\nlistenURIs = tcp://hubzero.org:830, tls://hubzero.org:831\n";
        let uris = listen_uris(conf);
        assert_eq!(uris.len(), 2);
        assert_eq!(uris[0].host, "hubzero.org");
        assert_eq!(uris[0].port, 830);
        assert_eq!(uris[1].scheme, "tls");
    }

    #[test]
    fn test_invoked_tool_output() {
        let out = "xvfb noise\nexec'ing sh ./slow_echo hi\nhi\n=SUBMIT-METRICS=> job=3\n";
        assert_eq!(invoked_tool_output(out).as_deref(), Some("hi"));
        assert_eq!(invoked_tool_output("never started"), None);
    }

    #[test]
    fn test_ps_rows_and_lookup() {
        let out = "USER PID %CPU %MEM VSZ RSS TTY STAT START TIME COMMAND\n\
                   alice 4242 0.0 0.0 4200 700 pts/1 S 10:01 0:00 sleep 23995946712\n\
                   alice 4243 0.0 0.0 4200 700 pts/1 S 10:01 0:00 sleep 1\n";
        let rows = ps_rows(out);
        assert_eq!(rows.len(), 2);
        let row = find_process(&rows, "sleep 23995946712").unwrap();
        assert_eq!(row.pid, 4242);
        assert!(find_process(&rows, "sleep").is_none());
    }

    #[test]
    fn test_tool_parameters_path() {
        assert_eq!(
            tool_parameters_path("HOME=/home/u\nTOOL_PARAMETERS=/tmp/p.hz\n").as_deref(),
            Some("/tmp/p.hz")
        );
    }

    #[test_case("vim", true)]
    #[test_case("libc6", true ; "arch suffix")]
    #[test_case("vi", false ; "prefix only")]
    #[test_case("emacs", false)]
    fn test_is_package_installed(pkg: &str, expected: bool) {
        let listing = "ii  vim 2:8.0 amd64 editor\nii  libc6:amd64 2.28 amd64 libc\nrc  emacs 26 all removed\n";
        assert_eq!(is_package_installed(listing, pkg), expected);
    }

    #[test_case("True", true)]
    #[test_case("True\n", true)]
    #[test_case("False", false)]
    #[test_case("", false)]
    fn test_checknet_result(out: &str, expected: bool) {
        assert_eq!(checknet_result(out), expected);
    }

    #[test]
    fn test_first_integer() {
        assert_eq!(first_integer("created session 8812"), Some(8812));
        assert_eq!(first_integer("none"), None);
    }

    #[test]
    fn test_session_rows() {
        let out = "Session Owner Started Name\n 8812 alice 2024-01-01 workspace\n 8813 alice 2024-01-01 hcrun\n";
        let rows = session_rows(out);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].number, 8812);
        assert_eq!(rows[1].title(), "hcrun");
    }

    #[test]
    fn test_clientaction_urls() {
        let log = "/usr/bin/clientaction url /filexfer/W8/download/hi?token=A\n\
                   /usr/bin/clientaction url /filexfer/W8/download/hi?token=B\n";
        assert_eq!(
            clientaction_urls(log).last().map(String::as_str),
            Some("/filexfer/W8/download/hi?token=B")
        );
    }

    #[test]
    fn test_pagination_counts() {
        let counts = pagination_counts("Results 1 - 20 of 345").unwrap();
        assert_eq!((counts.start, counts.end, counts.total), (1, 20, 345));
    }
}
