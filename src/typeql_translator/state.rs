use std::collections::{HashMap, HashSet};

use super::errors::TranslationError;

/// Which block new statements land in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// The first `match` block.
    Match,
    /// The `match` block after `reduce`; only groupby keys and reducer outputs are visible.
    PostReduce,
}

/// Per-query translation state. Created fresh for every translation attempt.
#[derive(Debug, Clone)]
pub struct TranslationState {
    /// Cypher variable -> TypeQL entity or relation type.
    pub variable_types: HashMap<String, String>,
    /// Cypher variable -> Neo4j label (explicit or inferred from the schema).
    pub variable_labels: HashMap<String, String>,
    /// (Cypher variable, attribute) -> bound attribute variable.
    pub declared_attribute_vars: HashMap<(String, String), String>,
    pub match_statements: Vec<String>,
    pub post_reduce_statements: Vec<String>,
    pub aggregation_alias: Option<String>,
    pub group_by_vars: Vec<String>,

    /// Cypher alias or normalised expression text -> TypeQL variable.
    aliases: HashMap<String, String>,
    /// `WITH p AS person` style renames of pattern variables.
    renames: HashMap<String, String>,
    /// Entity groupby keys: Cypher variable -> [(attribute, variable)].
    entity_group_keys: HashMap<String, Vec<(String, String)>>,
    pattern_vars: HashSet<String>,
    isa_declared: HashSet<String>,
    used_names: HashSet<String>,
    reserved: HashSet<String>,
    anon_counter: usize,
    stage: Stage,
    scope: Option<HashSet<String>>,
}

fn sanitize(base: &str) -> String {
    let cleaned: String = base
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect();
    match cleaned.chars().next() {
        Some(c) if c.is_ascii_alphabetic() => cleaned,
        Some(_) => format!("v{}", cleaned),
        None => "v".to_string(),
    }
}

/// Key used to look up an aggregate or arithmetic item by its Cypher text.
pub(crate) fn expression_key(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

impl TranslationState {
    /// `reserved` holds every identifier in the source query so generated
    /// names never shadow a Cypher variable or alias.
    pub fn new<I: IntoIterator<Item = String>>(reserved: I) -> Self {
        TranslationState {
            variable_types: HashMap::new(),
            variable_labels: HashMap::new(),
            declared_attribute_vars: HashMap::new(),
            match_statements: Vec::new(),
            post_reduce_statements: Vec::new(),
            aggregation_alias: None,
            group_by_vars: Vec::new(),
            aliases: HashMap::new(),
            renames: HashMap::new(),
            entity_group_keys: HashMap::new(),
            pattern_vars: HashSet::new(),
            isa_declared: HashSet::new(),
            used_names: HashSet::new(),
            reserved: reserved.into_iter().collect(),
            anon_counter: 0,
            stage: Stage::Match,
            scope: None,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Fresh variable name derived from `base`, never colliding with a
    /// reserved or already generated name.
    pub fn fresh_name(&mut self, base: &str) -> String {
        let base = sanitize(base);
        let mut candidate = base.clone();
        let mut n = 2;
        while self.used_names.contains(&candidate) || self.reserved.contains(&candidate) {
            candidate = format!("{}{}", base, n);
            n += 1;
        }
        self.used_names.insert(candidate.clone());
        candidate
    }

    /// Use `name` itself when it is free (reserved names allowed), else a fresh variant.
    pub fn claim_name(&mut self, name: &str) -> String {
        let name = sanitize(name);
        if self.used_names.insert(name.clone()) {
            name
        } else {
            self.fresh_name(&name)
        }
    }

    pub fn anonymous_var(&mut self) -> String {
        self.anon_counter += 1;
        let base = format!("anon{}", self.anon_counter);
        let name = self.fresh_name(&base);
        self.pattern_vars.insert(name.clone());
        name
    }

    /// Register a Cypher pattern variable; it keeps its own name in TypeQL.
    pub fn bind_pattern_var(&mut self, var: &str) -> Result<String, TranslationError> {
        let var = self.canonical_var(var);
        if self.stage == Stage::PostReduce && !self.pattern_vars.contains(&var) {
            return Err(TranslationError::unsupported(format!(
                "new pattern variable `{}` after aggregation",
                var
            )));
        }
        if self.aliases.contains_key(&var) {
            return Err(TranslationError::unsupported(format!(
                "alias `{}` reused as a pattern variable",
                var
            )));
        }
        self.used_names.insert(var.clone());
        self.pattern_vars.insert(var.clone());
        Ok(var)
    }

    pub fn is_pattern_var(&self, var: &str) -> bool {
        self.pattern_vars.contains(&self.canonical_var(var))
    }

    /// Follow `WITH x AS y` renames back to the pattern variable.
    pub fn canonical_var(&self, var: &str) -> String {
        let mut current = var;
        let mut hops = 0;
        while let Some(next) = self.renames.get(current) {
            current = next;
            hops += 1;
            if hops > self.renames.len() {
                break;
            }
        }
        current.to_string()
    }

    pub fn rename(&mut self, alias: &str, var: &str) {
        if alias != var {
            self.renames.insert(alias.to_string(), var.to_string());
        }
    }

    pub fn is_isa_declared(&self, var: &str) -> bool {
        self.isa_declared.contains(var)
    }

    pub fn declare_isa(&mut self, var: &str) {
        self.isa_declared.insert(var.to_string());
    }

    pub fn owner_type(&self, var: &str) -> Option<&str> {
        self.variable_types.get(var).map(String::as_str)
    }

    pub fn push_statement(&mut self, statement: String) {
        match self.stage {
            Stage::Match => self.match_statements.push(statement),
            Stage::PostReduce => self.post_reduce_statements.push(statement),
        }
    }

    pub fn stage_statements(&self) -> &[String] {
        match self.stage {
            Stage::Match => &self.match_statements,
            Stage::PostReduce => &self.post_reduce_statements,
        }
    }

    /// The variable bound to `var has attribute`, emitting the binding on
    /// first use. After a reduce only existing in-scope bindings resolve.
    pub fn attribute_var(&mut self, var: &str, attribute: &str) -> Result<String, TranslationError> {
        let key = (var.to_string(), attribute.to_string());
        if let Some(existing) = self.declared_attribute_vars.get(&key) {
            if !self.in_scope(existing) {
                return Err(TranslationError::out_of_scope(&format!("{}.{}", var, attribute)));
            }
            return Ok(existing.clone());
        }
        if self.stage == Stage::PostReduce {
            return Err(TranslationError::out_of_scope(&format!("{}.{}", var, attribute)));
        }
        if !self.pattern_vars.contains(var) {
            return Err(TranslationError::unbound(var));
        }

        let name = self.fresh_name(&format!("{}{}", var, attribute));
        self.push_statement(format!("${} has {} ${};", var, attribute, name));
        self.declared_attribute_vars.insert(key, name.clone());
        Ok(name)
    }

    pub fn register_alias(&mut self, alias: &str, target: &str) {
        self.aliases.insert(alias.to_string(), target.to_string());
    }

    pub fn resolve_alias(&self, alias: &str) -> Option<&str> {
        self.aliases.get(alias).map(String::as_str)
    }

    pub fn register_expression(&mut self, text: &str, target: &str) {
        self.aliases
            .insert(format!("expr:{}", expression_key(text)), target.to_string());
    }

    pub fn resolve_expression(&self, text: &str) -> Option<&str> {
        self.aliases
            .get(&format!("expr:{}", expression_key(text)))
            .map(String::as_str)
    }

    pub fn set_entity_group_keys(&mut self, var: &str, keys: Vec<(String, String)>) {
        self.entity_group_keys.insert(var.to_string(), keys);
    }

    pub fn entity_group_keys(&self, var: &str) -> Option<&[(String, String)]> {
        self.entity_group_keys.get(var).map(Vec::as_slice)
    }

    pub fn in_scope(&self, name: &str) -> bool {
        self.scope.as_ref().is_none_or(|scope| scope.contains(name))
    }

    pub fn require_in_scope(&self, name: &str) -> Result<(), TranslationError> {
        if self.in_scope(name) {
            Ok(())
        } else {
            Err(TranslationError::out_of_scope(name))
        }
    }

    /// Switch to the post-reduce block; only `visible` stays addressable.
    pub fn enter_reduce(&mut self, visible: HashSet<String>) {
        self.stage = Stage::PostReduce;
        self.scope = Some(visible);
    }

    pub fn add_to_scope(&mut self, name: &str) {
        if let Some(scope) = self.scope.as_mut() {
            scope.insert(name.to_string());
        }
    }

    /// Child state for a `{ ... }` block (disjunction branch or negation).
    /// Bindings made inside stay local; generated names are merged back via
    /// [`TranslationState::absorb_names`].
    pub fn branch(&self) -> TranslationState {
        let mut child = self.clone();
        child.match_statements.clear();
        child.post_reduce_statements.clear();
        child
    }

    pub fn absorb_names(&mut self, child: &TranslationState) {
        self.used_names.extend(child.used_names.iter().cloned());
        self.anon_counter = self.anon_counter.max(child.anon_counter);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> TranslationState {
        TranslationState::new(["p".to_string(), "c".to_string(), "pname2".to_string()])
    }

    #[test]
    fn test_fresh_names_avoid_reserved() {
        let mut s = state();
        assert_eq!(s.fresh_name("p"), "p2");
        assert_eq!(s.fresh_name("x"), "x");
        assert_eq!(s.fresh_name("x"), "x2");
        assert_eq!(s.fresh_name("1st"), "v1st");
    }

    #[test]
    fn test_claim_name_allows_reserved() {
        let mut s = state();
        assert_eq!(s.claim_name("c"), "c");
        assert_eq!(s.claim_name("c"), "c2");
    }

    #[test]
    fn test_attribute_binding_is_reused() {
        let mut s = state();
        s.bind_pattern_var("p").unwrap();
        let first = s.attribute_var("p", "name").unwrap();
        let second = s.attribute_var("p", "name").unwrap();
        assert_eq!(first, "pname");
        assert_eq!(first, second);
        assert_eq!(s.match_statements, vec!["$p has name $pname;".to_string()]);
    }

    #[test]
    fn test_attribute_binding_requires_pattern_var() {
        let mut s = state();
        assert_eq!(
            s.attribute_var("q", "name"),
            Err(TranslationError::unbound("q"))
        );
    }

    #[test]
    fn test_post_reduce_scope() {
        let mut s = state();
        s.bind_pattern_var("p").unwrap();
        let pname = s.attribute_var("p", "name").unwrap();
        s.attribute_var("p", "born").unwrap();
        s.enter_reduce([pname.clone()].into_iter().collect());

        assert_eq!(s.attribute_var("p", "name").unwrap(), pname);
        assert!(matches!(
            s.attribute_var("p", "born"),
            Err(TranslationError::OutOfScope { .. })
        ));
        assert!(matches!(
            s.attribute_var("p", "age"),
            Err(TranslationError::OutOfScope { .. })
        ));
    }

    #[test]
    fn test_branch_keeps_bindings_local() {
        let mut s = state();
        s.bind_pattern_var("p").unwrap();
        let mut child = s.branch();
        let name = child.attribute_var("p", "age").unwrap();
        s.absorb_names(&child);
        assert!(s.declared_attribute_vars.is_empty());
        // name generated in the branch is not handed out again
        assert_ne!(s.fresh_name("page"), name);
    }

    #[test]
    fn test_renames_resolve_to_pattern_var() {
        let mut s = state();
        s.bind_pattern_var("p").unwrap();
        s.rename("person", "p");
        assert!(s.is_pattern_var("person"));
        assert_eq!(s.canonical_var("person"), "p");
    }

    #[test]
    fn test_expression_lookup_ignores_spacing_and_case() {
        let mut s = state();
        s.register_expression("count( m )", "c");
        assert_eq!(s.resolve_expression("COUNT(m)"), Some("c"));
    }
}
