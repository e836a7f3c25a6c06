//! Final TypeQL text assembly.
//!
//! Stages are rendered in the pipeline order
//! `match` → [`reduce`] → [`match`] → [`select`/`distinct`]
//! → [`sort`] → [`offset`] → [`limit`] → `fetch`.
//!
//! A terminal `reduce` (count-only returns and implicit grouping) is the one
//! exception: it is rendered right after `select`/`distinct` and before
//! `sort`/`offset`/`limit`, so ordering and truncation apply to the reduced
//! rows rather than to the rows feeding the aggregate. Cypher's
//! `RETURN ... ORDER BY ... LIMIT` has the same meaning.

use crate::cypher_parser::ast::AggregateFn;

/// Render a translated structure as TypeQL text.
pub trait ToTypeQl {
    fn to_typeql(&self) -> String;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reducer {
    /// Output variable, without `$`.
    pub var: String,
    pub function: AggregateFn,
    /// Argument variable; `None` for `count(*)`.
    pub argument: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReduceStage {
    pub reducers: Vec<Reducer>,
    pub group_by: Vec<String>,
    /// `count(DISTINCT x)`: rows are de-duplicated over these variables first.
    pub distinct_select: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub var: String,
    pub descending: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchValue {
    Var(String),
    /// Nested object of `key -> variable`, used for whole-entity returns.
    Object(Vec<(String, String)>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchEntry {
    pub key: String,
    pub value: FetchValue,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryOutput {
    Fetch(Vec<FetchEntry>),
    /// The query returns only aggregates; the reduction is the last stage.
    Reduce(ReduceStage),
}

/// A fully translated query, ready to render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeQlQuery {
    pub match_statements: Vec<String>,
    pub reduce: Option<ReduceStage>,
    pub post_reduce_match: Vec<String>,
    /// `RETURN DISTINCT`: variables kept by `select` before `distinct`.
    pub select_distinct: Option<Vec<String>>,
    pub sort: Vec<SortKey>,
    pub offset: Option<u64>,
    pub limit: Option<u64>,
    pub output: QueryOutput,
}

fn dollar_list(vars: &[String]) -> String {
    vars.iter()
        .map(|v| format!("${}", v))
        .collect::<Vec<_>>()
        .join(", ")
}

fn reduce_function_name(function: AggregateFn) -> &'static str {
    match function {
        AggregateFn::Count => "count",
        AggregateFn::Sum => "sum",
        AggregateFn::Avg => "mean",
        AggregateFn::Min => "min",
        AggregateFn::Max => "max",
    }
}

impl ToTypeQl for Reducer {
    fn to_typeql(&self) -> String {
        let function = reduce_function_name(self.function);
        match &self.argument {
            Some(arg) => format!("${} = {}(${})", self.var, function, arg),
            None => format!("${} = {}", self.var, function),
        }
    }
}

impl ToTypeQl for ReduceStage {
    fn to_typeql(&self) -> String {
        let mut out = String::new();
        if let Some(vars) = &self.distinct_select {
            out.push_str(&format!("select {};\ndistinct;\n", dollar_list(vars)));
        }
        let reducers: Vec<String> = self.reducers.iter().map(ToTypeQl::to_typeql).collect();
        out.push_str("reduce ");
        out.push_str(&reducers.join(", "));
        if !self.group_by.is_empty() {
            out.push_str(" groupby ");
            out.push_str(&dollar_list(&self.group_by));
        }
        out.push(';');
        out
    }
}

impl ToTypeQl for FetchEntry {
    fn to_typeql(&self) -> String {
        match &self.value {
            FetchValue::Var(var) => format!("{}: ${}", json_key(&self.key), var),
            FetchValue::Object(fields) => {
                let inner: Vec<String> = fields
                    .iter()
                    .map(|(key, var)| format!("{}: ${}", json_key(key), var))
                    .collect();
                format!("{}: {{ {} }}", json_key(&self.key), inner.join(", "))
            }
        }
    }
}

fn json_key(key: &str) -> String {
    format!("\"{}\"", key.replace('\\', "\\\\").replace('"', "\\\""))
}

fn render_match(out: &mut String, statements: &[String]) {
    match statements {
        [] => {}
        [only] => {
            out.push_str("match ");
            out.push_str(only);
            out.push('\n');
        }
        many => {
            out.push_str("match\n");
            for statement in many {
                out.push_str("  ");
                out.push_str(statement);
                out.push('\n');
            }
        }
    }
}

impl ToTypeQl for TypeQlQuery {
    fn to_typeql(&self) -> String {
        let mut out = String::from("match\n");
        for statement in &self.match_statements {
            out.push_str("  ");
            out.push_str(statement);
            out.push('\n');
        }

        if let Some(reduce) = &self.reduce {
            out.push_str(&reduce.to_typeql());
            out.push('\n');
            render_match(&mut out, &self.post_reduce_match);
        }

        if let Some(vars) = &self.select_distinct {
            out.push_str(&format!("select {};\ndistinct;\n", dollar_list(vars)));
        }

        if let QueryOutput::Reduce(stage) = &self.output {
            out.push_str(&stage.to_typeql());
            out.push('\n');
        }

        if !self.sort.is_empty() {
            let keys: Vec<String> = self
                .sort
                .iter()
                .map(|k| {
                    format!("${} {}", k.var, if k.descending { "desc" } else { "asc" })
                })
                .collect();
            out.push_str(&format!("sort {};\n", keys.join(", ")));
        }
        if let Some(offset) = self.offset {
            out.push_str(&format!("offset {};\n", offset));
        }
        if let Some(limit) = self.limit {
            out.push_str(&format!("limit {};\n", limit));
        }

        if let QueryOutput::Fetch(entries) = &self.output {
            let body: Vec<String> = entries.iter().map(ToTypeQl::to_typeql).collect();
            out.push_str(&format!("fetch {{ {} }};\n", body.join(", ")));
        }
        out.trim_end().to_string()
    }
}
