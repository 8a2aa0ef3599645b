//! 过滤语言编译与分页
//!
//! 每个字段的原始过滤串按逗号切分：`-` 开头的 token 为排除项，其余为包含项。
//! 同一字段内包含项 OR、排除项逐个 AND；字段之间 AND。

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Deserialize;

use super::models::LogPage;
use super::predicate::{Clause, Column, Predicate, SortSpec, TextMatch};
use super::repository::LogRepository;
use crate::clock::epoch_seconds;
use crate::error::AppError;

/// 固定页大小
pub const PAGE_SIZE: i64 = 50;

/// 表现层传入的原始过滤参数（查询串编码即为线上契约）
#[derive(Debug, Clone, Default, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct RawLogFilters {
    /// 起始时间（YYYY-MM-DDTHH:MM 或 YYYY-MM-DD，UTC）
    pub time_from: Option<String>,
    /// 截止时间（YYYY-MM-DDTHH:MM 或 YYYY-MM-DD，UTC）
    pub time_to: Option<String>,
    /// 状态码，如 `404,500` 或 `-200`
    pub status: Option<String>,
    /// 国家（精确匹配），如 `eu,-fr`
    pub country: Option<String>,
    /// 路径（子串匹配）
    pub path: Option<String>,
    /// HTTP 方法（精确匹配）
    pub method: Option<String>,
    /// Host（精确匹配）
    pub host: Option<String>,
    /// User-Agent（子串匹配）
    pub user_agent: Option<String>,
    /// 排序列（白名单外回退为 time）
    pub sort: Option<String>,
    /// asc | desc
    pub order: Option<String>,
    /// 页码（从 1 开始；无法解析时按第 1 页处理）
    pub page: Option<String>,
}

impl RawLogFilters {
    pub fn page_number(&self) -> Option<i64> {
        self.page.as_deref().and_then(|p| p.trim().parse().ok())
    }
}

/// 单个字段解析后的包含/排除集合
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TokenSet<T> {
    pub include: Vec<T>,
    pub exclude: Vec<T>,
}

/// 解析后的查询过滤规格
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryFilterSpec {
    pub time_from: Option<DateTime<Utc>>,
    pub time_to: Option<DateTime<Utc>>,
    pub status: TokenSet<i64>,
    pub country: TokenSet<String>,
    pub path: TokenSet<String>,
    pub method: TokenSet<String>,
    pub host: TokenSet<String>,
    pub user_agent: TokenSet<String>,
    pub sort: SortSpec,
}

/// 切分文本过滤串
pub fn parse_text_tokens(raw: &str) -> TokenSet<String> {
    let mut set = TokenSet::default();
    for token in raw.split(',') {
        let t = token.trim();
        if t.is_empty() {
            continue;
        }
        if let Some(rest) = t.strip_prefix('-') {
            let rest = rest.trim();
            if !rest.is_empty() {
                set.exclude.push(rest.to_string());
            }
            continue;
        }
        set.include.push(t.to_string());
    }
    set
}

/// 切分数值过滤串；无法解析的 token 直接丢弃
pub fn parse_int_tokens(raw: &str) -> TokenSet<i64> {
    let mut set = TokenSet::default();
    for token in raw.split(',') {
        let t = token.trim();
        if t.is_empty() {
            continue;
        }
        if let Some(rest) = t.strip_prefix('-') {
            if let Ok(n) = rest.trim().parse::<i64>() {
                set.exclude.push(n);
            }
            continue;
        }
        if let Ok(n) = t.parse::<i64>() {
            set.include.push(n);
        }
    }
    set
}

/// 解析表单时间（按 UTC 解释）；格式不对时返回 None
pub fn parse_time_bound(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M") {
        return Some(dt.and_utc());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

fn text_tokens(raw: Option<&str>) -> TokenSet<String> {
    raw.map(parse_text_tokens).unwrap_or_default()
}

impl QueryFilterSpec {
    pub fn from_raw(raw: &RawLogFilters) -> Self {
        Self {
            time_from: raw.time_from.as_deref().and_then(parse_time_bound),
            time_to: raw.time_to.as_deref().and_then(parse_time_bound),
            status: raw
                .status
                .as_deref()
                .map(parse_int_tokens)
                .unwrap_or_default(),
            country: text_tokens(raw.country.as_deref()),
            path: text_tokens(raw.path.as_deref()),
            method: text_tokens(raw.method.as_deref()),
            host: text_tokens(raw.host.as_deref()),
            user_agent: text_tokens(raw.user_agent.as_deref()),
            sort: SortSpec::parse(raw.sort.as_deref(), raw.order.as_deref()),
        }
    }

    /// 编译为参数化谓词
    pub fn compile(&self) -> Predicate {
        let mut p = Predicate::new();
        if let Some(from) = self.time_from {
            p.push(Clause::TimeAtLeast(epoch_seconds(from)));
        }
        if let Some(to) = self.time_to {
            p.push(Clause::TimeAtMost(epoch_seconds(to)));
        }

        p.push(Clause::IntIn {
            column: Column::Status,
            values: self.status.include.clone(),
            negated: false,
        });
        p.push(Clause::IntIn {
            column: Column::Status,
            values: self.status.exclude.clone(),
            negated: true,
        });

        let text_fields = [
            (Column::Country, TextMatch::Exact, &self.country),
            (Column::Path, TextMatch::Contains, &self.path),
            (Column::Method, TextMatch::Exact, &self.method),
            (Column::Host, TextMatch::Exact, &self.host),
            (Column::UserAgent, TextMatch::Contains, &self.user_agent),
        ];
        for (column, mode, set) in text_fields {
            p.push(Clause::TextAnyOf {
                column,
                mode,
                values: set.include.clone(),
            });
            for value in &set.exclude {
                p.push(Clause::TextNot {
                    column,
                    mode,
                    value: value.clone(),
                });
            }
        }
        p
    }
}

/// 页数：ceil(total / PAGE_SIZE)，至少为 1
pub fn page_count(total: i64) -> i64 {
    ((total + PAGE_SIZE - 1) / PAGE_SIZE).max(1)
}

/// 执行一次分页查询；越界页返回空列表而非错误
pub async fn fetch_page<R: LogRepository>(
    repo: &R,
    spec: &QueryFilterSpec,
    page: Option<i64>,
) -> Result<LogPage, AppError> {
    let page = page.unwrap_or(1).max(1);
    let predicate = spec.compile();
    let offset = (page - 1).saturating_mul(PAGE_SIZE);
    let (entries, total) = repo
        .query(&predicate, spec.sort, PAGE_SIZE, offset)
        .await?;
    Ok(LogPage {
        entries,
        total,
        page,
        pages: page_count(total),
        sort: spec.sort.column.as_str().to_string(),
        order: spec.sort.direction.as_str().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::logs::predicate::SortDirection;
    use chrono::TimeZone;
    use sqlx::{QueryBuilder, Sqlite};

    #[test]
    fn text_tokens_split_include_and_exclude() {
        let set = parse_text_tokens(" eu , -fr,- de ,, -");
        assert_eq!(set.include, vec!["eu"]);
        assert_eq!(set.exclude, vec!["fr", "de"]);
    }

    #[test]
    fn int_tokens_drop_garbage() {
        let set = parse_int_tokens("404, 5xx, -200, -abc, 500");
        assert_eq!(set.include, vec![404, 500]);
        assert_eq!(set.exclude, vec![200]);
    }

    #[test]
    fn country_include_exclude_compiles_to_and_of_groups() {
        let raw = RawLogFilters {
            country: Some("eu,-fr".into()),
            ..Default::default()
        };
        let p = QueryFilterSpec::from_raw(&raw).compile();
        assert_eq!(
            p.clauses(),
            &[
                Clause::TextAnyOf {
                    column: Column::Country,
                    mode: TextMatch::Exact,
                    values: vec!["eu".into()],
                },
                Clause::TextNot {
                    column: Column::Country,
                    mode: TextMatch::Exact,
                    value: "fr".into(),
                },
            ]
        );

        let mut qb = QueryBuilder::<Sqlite>::new("SELECT COUNT(1) FROM log_entries");
        p.push_where(&mut qb);
        assert_eq!(
            qb.sql(),
            "SELECT COUNT(1) FROM log_entries WHERE (country = ?) AND country <> ?"
        );
    }

    #[test]
    fn status_uses_in_and_not_in() {
        let raw = RawLogFilters {
            status: Some("404,500,-200".into()),
            ..Default::default()
        };
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT 1 FROM log_entries");
        QueryFilterSpec::from_raw(&raw).compile().push_where(&mut qb);
        assert_eq!(
            qb.sql(),
            "SELECT 1 FROM log_entries WHERE status IN (?, ?) AND status NOT IN (?)"
        );
    }

    #[test]
    fn time_bounds_accept_two_formats() {
        assert_eq!(
            parse_time_bound("2024-03-01T08:30"),
            Some(Utc.with_ymd_and_hms(2024, 3, 1, 8, 30, 0).unwrap())
        );
        assert_eq!(
            parse_time_bound("2024-03-01"),
            Some(Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap())
        );
        assert_eq!(parse_time_bound("yesterday"), None);
        assert_eq!(parse_time_bound(""), None);
    }

    #[test]
    fn unknown_sort_falls_back() {
        let raw = RawLogFilters {
            sort: Some("password".into()),
            order: Some("desc".into()),
            ..Default::default()
        };
        let spec = QueryFilterSpec::from_raw(&raw);
        assert_eq!(spec.sort.column, Column::Time);
        assert_eq!(spec.sort.direction, SortDirection::Desc);
    }

    #[test]
    fn garbage_page_is_ignored() {
        let raw = RawLogFilters {
            page: Some("two".into()),
            ..Default::default()
        };
        assert_eq!(raw.page_number(), None);
        let raw = RawLogFilters {
            page: Some(" 3 ".into()),
            ..Default::default()
        };
        assert_eq!(raw.page_number(), Some(3));
    }

    #[test]
    fn page_count_is_at_least_one() {
        assert_eq!(page_count(0), 1);
        assert_eq!(page_count(50), 1);
        assert_eq!(page_count(51), 2);
        assert_eq!(page_count(120), 3);
    }
}
