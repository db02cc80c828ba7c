use serde::Serialize;

use super::{ODataPath, PathError, PathSegment, PathTarget};
use crate::model::EdmModel;

/// Parsed `$expand` option: the related resources a request asks to inline.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExpandClause {
    pub items: Vec<ExpandItem>,
}

/// One expanded navigation path, with the expansions nested inside it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExpandItem {
    /// Optional type casts followed by exactly one navigation segment.
    pub path: Vec<PathSegment>,
    #[serde(skip_serializing_if = "ExpandClause::is_empty")]
    pub expand: ExpandClause,
}

impl ExpandItem {
    pub fn new(path: Vec<PathSegment>) -> Self {
        Self {
            path,
            expand: ExpandClause::default(),
        }
    }

    pub fn with_expand(mut self, expand: ExpandClause) -> Self {
        self.expand = expand;
        self
    }
}

impl ExpandClause {
    pub fn new(items: Vec<ExpandItem>) -> Self {
        Self { items }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Parse an `$expand` value relative to the resource `path` addresses.
    pub fn parse(model: &EdmModel, path: &ODataPath, text: &str) -> Result<Self, PathError> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        let target = path.target().ok_or(PathError::ExpandNotApplicable)?;
        parse_clause(model, target, text)
    }

    /// Every expansion node as the full chain of segments from the top of the
    /// tree down to it, parents before children.
    pub fn navigation_paths(&self) -> Vec<Vec<&PathSegment>> {
        let mut out = Vec::new();
        collect_paths(self, &[], &mut out);
        out
    }
}

fn collect_paths<'a>(clause: &'a ExpandClause, prefix: &[&'a PathSegment], out: &mut Vec<Vec<&'a PathSegment>>) {
    for item in &clause.items {
        let mut full = prefix.to_vec();
        full.extend(item.path.iter());
        out.push(full.clone());
        collect_paths(&item.expand, &full, out);
    }
}

fn parse_clause(model: &EdmModel, target: &PathTarget, text: &str) -> Result<ExpandClause, PathError> {
    let mut items = Vec::new();

    for raw in split_top_level(text, ',')? {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(PathError::InvalidExpand(format!("empty item in `{text}`")));
        }

        let (path_text, options) = match raw.find('(') {
            Some(open) => {
                let options = raw[open + 1..]
                    .strip_suffix(')')
                    .ok_or_else(|| PathError::InvalidExpand(raw.to_string()))?;
                (raw[..open].trim(), Some(options))
            }
            None => (raw, None),
        };
        let path_text = path_text.strip_suffix("/$ref").unwrap_or(path_text);

        if path_text == "*" {
            for name in model.navigation_property_names(&target.entity_type) {
                let (segment, _) = navigation_segment(model, target, name)?;
                items.push(ExpandItem::new(vec![segment]));
            }
            continue;
        }

        let (path, nested_target) = parse_item_path(model, target, path_text)?;
        let expand = match options.map(nested_expand).transpose()?.flatten() {
            Some(nested) => parse_clause(model, &nested_target, nested)?,
            None => ExpandClause::default(),
        };
        items.push(ExpandItem::new(path).with_expand(expand));
    }

    Ok(ExpandClause { items })
}

/// `Sample.Vip/Orders` → cast segments plus the trailing navigation.
fn parse_item_path(
    model: &EdmModel,
    target: &PathTarget,
    text: &str,
) -> Result<(Vec<PathSegment>, PathTarget), PathError> {
    let mut segments = Vec::new();
    let mut current = target.clone();
    let mut parts = text.split('/').peekable();

    while let Some(part) = parts.next() {
        let part = part.trim();
        let is_last = parts.peek().is_none();

        if !is_last {
            let derived = part.contains('.')
                && model.entity_type(part).is_some()
                && model.derives_from(part, &current.entity_type);
            if !derived {
                return Err(PathError::InvalidExpand(format!("`{part}` is not a type cast in `{text}`")));
            }
            segments.push(PathSegment::TypeCast {
                type_name: part.to_string(),
            });
            current.entity_type = model.unqualify(part).to_string();
            continue;
        }

        let (segment, next) = navigation_segment(model, &current, part)?;
        segments.push(segment);
        return Ok((segments, next));
    }

    Err(PathError::InvalidExpand(format!("empty path in `{text}`")))
}

fn navigation_segment(model: &EdmModel, target: &PathTarget, name: &str) -> Result<(PathSegment, PathTarget), PathError> {
    let navigation = model.navigation_property(&target.entity_type, name).ok_or_else(|| {
        PathError::InvalidExpand(format!(
            "`{name}` is not a navigation property of `{}`",
            target.entity_type
        ))
    })?;

    let binding = target
        .navigation_source
        .as_deref()
        .and_then(|source| model.navigation_source(source))
        .and_then(|source| source.navigation_bindings.get(name))
        .cloned();

    let segment = PathSegment::navigation(name, binding.as_deref());
    let next = PathTarget {
        entity_type: model.unqualify(&navigation.target).to_string(),
        navigation_source: binding,
        collection: navigation.collection,
    };
    Ok((segment, next))
}

/// The `$expand=...` value inside an item's option list, if any.
fn nested_expand(options: &str) -> Result<Option<&str>, PathError> {
    for option in split_top_level(options, ';')? {
        if let Some((name, value)) = option.split_once('=') {
            if name.trim().eq_ignore_ascii_case("$expand") {
                return Ok(Some(value.trim()));
            }
        }
    }
    Ok(None)
}

/// Split on `separator` outside of parentheses.
fn split_top_level(text: &str, separator: char) -> Result<Vec<&str>, PathError> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;

    for (index, ch) in text.char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| PathError::InvalidExpand(format!("unbalanced `)` in `{text}`")))?;
            }
            c if c == separator && depth == 0 => {
                parts.push(&text[start..index]);
                start = index + c.len_utf8();
            }
            _ => {}
        }
    }

    if depth != 0 {
        return Err(PathError::InvalidExpand(format!("unbalanced `(` in `{text}`")));
    }
    parts.push(&text[start..]);
    Ok(parts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::fixtures::model;

    fn customers(model: &EdmModel) -> ODataPath {
        ODataPath::parse(model, "Customers").unwrap()
    }

    #[test]
    fn parses_nested_expand_and_ignores_other_options() {
        let model = model();
        let path = customers(&model);

        let clause = ExpandClause::parse(&model, &path, "Orders($select=Id;$expand=Items($top=2)),Favorite").unwrap();

        assert_eq!(clause.items.len(), 2);
        let orders = &clause.items[0];
        assert_eq!(orders.path, vec![PathSegment::navigation("Orders", Some("Orders"))]);
        assert_eq!(
            orders.expand.items[0].path,
            vec![PathSegment::navigation("Items", Some("Products"))]
        );
        assert_eq!(clause.items[1].path, vec![PathSegment::navigation("Favorite", Some("Products"))]);
    }

    #[test]
    fn navigation_paths_walk_parents_first() {
        let model = model();
        let path = customers(&model);
        let clause = ExpandClause::parse(&model, &path, "Orders($expand=Items)").unwrap();

        let paths = clause.navigation_paths();
        assert_eq!(paths.len(), 2);
        assert_eq!(paths[0].len(), 1);
        assert_eq!(
            paths[1].iter().filter_map(|s| s.navigation_name()).collect::<Vec<_>>(),
            vec!["Orders", "Items"]
        );
    }

    #[test]
    fn star_expands_every_navigation_property() {
        let model = model();
        let path = customers(&model);
        let clause = ExpandClause::parse(&model, &path, "*").unwrap();

        let names: Vec<_> = clause
            .items
            .iter()
            .filter_map(|item| item.path.last().and_then(PathSegment::navigation_name))
            .collect();
        assert_eq!(names, vec!["Favorite", "Orders"]);
    }

    #[test]
    fn casts_refs_and_errors() {
        let model = model();
        let path = customers(&model);

        let clause = ExpandClause::parse(&model, &path, "Sample.VipCustomer/Orders/$ref").unwrap();
        assert!(matches!(clause.items[0].path[0], PathSegment::TypeCast { .. }));

        assert!(matches!(
            ExpandClause::parse(&model, &path, "Name"),
            Err(PathError::InvalidExpand(_))
        ));
        assert!(matches!(
            ExpandClause::parse(&model, &path, "Orders($expand=Items"),
            Err(PathError::InvalidExpand(_))
        ));

        let value_path = ODataPath::parse(&model, "Customers(1)/Name").unwrap();
        assert_eq!(
            ExpandClause::parse(&model, &value_path, "Orders"),
            Err(PathError::ExpandNotApplicable)
        );
        assert_eq!(ExpandClause::parse(&model, &value_path, " "), Ok(ExpandClause::default()));
    }
}
