//! 查询谓词 AST 及其参数化渲染
//!
//! 过滤条件先构造成 [`Predicate`]，再通过 `QueryBuilder::push_bind` 渲染；
//! 用户输入只会以绑定参数出现，SQL 文本中只有白名单列名与固定运算符。

use sqlx::{QueryBuilder, Sqlite};

/// `log_entries` 中允许参与过滤/排序的列（白名单）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Column {
    Time,
    RemoteAddr,
    Host,
    Method,
    Path,
    Query,
    Protocol,
    Status,
    Bytes,
    City,
    Country,
    UserAgent,
}

impl Column {
    pub const ALL: [Column; 12] = [
        Column::Time,
        Column::RemoteAddr,
        Column::Host,
        Column::Method,
        Column::Path,
        Column::Query,
        Column::Protocol,
        Column::Status,
        Column::Bytes,
        Column::City,
        Column::Country,
        Column::UserAgent,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Column::Time => "time",
            Column::RemoteAddr => "remote_addr",
            Column::Host => "host",
            Column::Method => "method",
            Column::Path => "path",
            Column::Query => "query",
            Column::Protocol => "protocol",
            Column::Status => "status",
            Column::Bytes => "bytes",
            Column::City => "city",
            Column::Country => "country",
            Column::UserAgent => "user_agent",
        }
    }

    /// 按列名查找；不在白名单中返回 None
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        }
    }
}

/// 排序规格：默认按时间升序，同值按 id 升序保证分页稳定
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortSpec {
    pub column: Column,
    pub direction: SortDirection,
}

impl Default for SortSpec {
    fn default() -> Self {
        Self {
            column: Column::Time,
            direction: SortDirection::Asc,
        }
    }
}

impl SortSpec {
    /// 解析排序参数：未知列静默回退为 time；仅 `desc` 表示降序
    pub fn parse(sort: Option<&str>, order: Option<&str>) -> Self {
        let column = sort
            .map(str::trim)
            .and_then(Column::from_name)
            .unwrap_or(Column::Time);
        let direction = match order.map(str::trim) {
            Some(o) if o.eq_ignore_ascii_case("desc") => SortDirection::Desc,
            _ => SortDirection::Asc,
        };
        Self { column, direction }
    }

    pub fn push_order_by(&self, qb: &mut QueryBuilder<'_, Sqlite>) {
        let dir = match self.direction {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        };
        qb.push(" ORDER BY ")
            .push(self.column.as_str())
            .push(" ")
            .push(dir)
            .push(", id ASC");
    }
}

/// 文本匹配方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextMatch {
    /// 精确相等
    Exact,
    /// 子串包含（LIKE，已转义通配符）
    Contains,
}

/// 单个谓词子句；同一 [`Predicate`] 内的子句之间为 AND
#[derive(Debug, Clone, PartialEq)]
pub enum Clause {
    /// time >= v
    TimeAtLeast(f64),
    /// time <= v
    TimeAtMost(f64),
    /// column [NOT] IN (v1, v2, ...)
    IntIn {
        column: Column,
        values: Vec<i64>,
        negated: bool,
    },
    /// (column ~ v1 OR column ~ v2 ...)
    TextAnyOf {
        column: Column,
        mode: TextMatch,
        values: Vec<String>,
    },
    /// column !~ v
    TextNot {
        column: Column,
        mode: TextMatch,
        value: String,
    },
}

/// 编译后的查询谓词
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Predicate {
    clauses: Vec<Clause>,
}

impl Predicate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, clause: Clause) {
        // 空集合子句没有意义：空 IN 会匹配不到任何行
        match &clause {
            Clause::IntIn { values, .. } if values.is_empty() => return,
            Clause::TextAnyOf { values, .. } if values.is_empty() => return,
            _ => {}
        }
        self.clauses.push(clause);
    }

    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// 追加 ` WHERE ...`；无子句时不输出任何内容
    pub fn push_where(&self, qb: &mut QueryBuilder<'_, Sqlite>) {
        for (i, clause) in self.clauses.iter().enumerate() {
            qb.push(if i == 0 { " WHERE " } else { " AND " });
            push_clause(qb, clause);
        }
    }
}

fn push_clause(qb: &mut QueryBuilder<'_, Sqlite>, clause: &Clause) {
    match clause {
        Clause::TimeAtLeast(v) => {
            qb.push("time >= ").push_bind(*v);
        }
        Clause::TimeAtMost(v) => {
            qb.push("time <= ").push_bind(*v);
        }
        Clause::IntIn {
            column,
            values,
            negated,
        } => {
            qb.push(column.as_str())
                .push(if *negated { " NOT IN (" } else { " IN (" });
            let mut sep = qb.separated(", ");
            for v in values {
                sep.push_bind(*v);
            }
            sep.push_unseparated(")");
        }
        Clause::TextAnyOf {
            column,
            mode,
            values,
        } => {
            qb.push("(");
            for (i, v) in values.iter().enumerate() {
                if i > 0 {
                    qb.push(" OR ");
                }
                push_text_match(qb, *column, *mode, v, false);
            }
            qb.push(")");
        }
        Clause::TextNot {
            column,
            mode,
            value,
        } => push_text_match(qb, *column, *mode, value, true),
    }
}

fn push_text_match(
    qb: &mut QueryBuilder<'_, Sqlite>,
    column: Column,
    mode: TextMatch,
    value: &str,
    negated: bool,
) {
    qb.push(column.as_str());
    match (mode, negated) {
        (TextMatch::Exact, false) => {
            qb.push(" = ").push_bind(value.to_string());
        }
        (TextMatch::Exact, true) => {
            qb.push(" <> ").push_bind(value.to_string());
        }
        (TextMatch::Contains, false) => {
            qb.push(" LIKE ")
                .push_bind(like_pattern(value))
                .push(" ESCAPE '\\'");
        }
        (TextMatch::Contains, true) => {
            qb.push(" NOT LIKE ")
                .push_bind(like_pattern(value))
                .push(" ESCAPE '\\'");
        }
    }
}

/// `%value%`，其中 `%`、`_`、`\` 按字面量转义
pub fn like_pattern(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('%');
    for ch in value.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(ch);
    }
    out.push('%');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(p: &Predicate) -> String {
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT 1 FROM log_entries");
        p.push_where(&mut qb);
        qb.sql().to_string()
    }

    #[test]
    fn empty_predicate_renders_no_where() {
        assert_eq!(render(&Predicate::new()), "SELECT 1 FROM log_entries");
    }

    #[test]
    fn clauses_are_and_combined_with_placeholders() {
        let mut p = Predicate::new();
        p.push(Clause::TimeAtLeast(1.0));
        p.push(Clause::IntIn {
            column: Column::Status,
            values: vec![404, 500],
            negated: false,
        });
        p.push(Clause::TextAnyOf {
            column: Column::Path,
            mode: TextMatch::Contains,
            values: vec!["api".into(), "admin".into()],
        });
        p.push(Clause::TextNot {
            column: Column::Host,
            mode: TextMatch::Exact,
            value: "example.com".into(),
        });
        assert_eq!(
            render(&p),
            "SELECT 1 FROM log_entries WHERE time >= ? AND status IN (?, ?) AND \
             (path LIKE ? ESCAPE '\\' OR path LIKE ? ESCAPE '\\') AND host <> ?"
        );
    }

    #[test]
    fn user_values_never_reach_sql_text() {
        let mut p = Predicate::new();
        p.push(Clause::TextAnyOf {
            column: Column::Country,
            mode: TextMatch::Exact,
            values: vec!["x' OR 1=1 --".into()],
        });
        let sql = render(&p);
        assert!(!sql.contains("OR 1=1"));
        assert!(sql.ends_with("WHERE (country = ?)"));
    }

    #[test]
    fn empty_sets_are_dropped() {
        let mut p = Predicate::new();
        p.push(Clause::IntIn {
            column: Column::Status,
            values: vec![],
            negated: true,
        });
        p.push(Clause::TextAnyOf {
            column: Column::Method,
            mode: TextMatch::Exact,
            values: vec![],
        });
        assert!(p.is_empty());
    }

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
        assert_eq!(like_pattern("a\\b"), "%a\\\\b%");
    }

    #[test]
    fn sort_spec_falls_back_to_time_ascending() {
        assert_eq!(SortSpec::parse(None, None), SortSpec::default());
        let s = SortSpec::parse(Some("id; DROP TABLE log_entries"), Some("DESC"));
        assert_eq!(s.column, Column::Time);
        assert_eq!(s.direction, SortDirection::Desc);
        let s = SortSpec::parse(Some("bytes"), Some("sideways"));
        assert_eq!(s.column, Column::Bytes);
        assert_eq!(s.direction, SortDirection::Asc);
    }

    #[test]
    fn order_by_has_id_tie_break() {
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT 1 FROM log_entries");
        SortSpec::parse(Some("status"), Some("desc")).push_order_by(&mut qb);
        assert_eq!(
            qb.sql(),
            "SELECT 1 FROM log_entries ORDER BY status DESC, id ASC"
        );
    }
}
