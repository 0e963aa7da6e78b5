//! Projection and relation expansion.
//!
//! Grammar shared by `select` and `expand`:
//!
//! ```text
//! list  := item (',' item)*
//! item  := path ('(' list ')')?
//! path  := name ('.' name)*
//! ```
//!
//! A scalar name selects that field. A relation name expands the relation;
//! the optional parenthesized list selects and expands inside it, and a
//! dotted path `a.b` is shorthand for `a(b)`.

use std::fmt;

use crate::config::QueryConfig;
use crate::error::{BadRequest, ParameterError, QueryError};
use crate::metadata::{FieldMeta, RecordMetadata};

/// One level of the projection tree.
///
/// An empty field list means every scalar field of the record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectExpandNode {
    fields: Vec<&'static str>,
    expand: Vec<(&'static str, SelectExpandNode)>,
}

impl SelectExpandNode {
    /// `true` when everything is selected and nothing is expanded.
    pub fn is_default(&self) -> bool {
        self.fields.is_empty() && self.expand.is_empty()
    }

    /// Explicitly selected scalar field names, in request order.
    pub fn fields(&self) -> &[&'static str] {
        &self.fields
    }

    /// Scalar fields to emit for a record of type `meta`, in declaration order.
    pub fn selected<'m>(&self, meta: &'m RecordMetadata) -> Vec<&'m FieldMeta> {
        meta.scalars()
            .filter(|f| self.fields.is_empty() || self.fields.contains(&f.name()))
            .collect()
    }

    /// Expanded relations with their nested projections.
    pub fn expansions(&self) -> impl Iterator<Item = (&'static str, &SelectExpandNode)> {
        self.expand.iter().map(|(name, node)| (*name, node))
    }

    pub fn expansion(&self, relation: &str) -> Option<&SelectExpandNode> {
        self.expand
            .iter()
            .find(|(name, _)| *name == relation)
            .map(|(_, node)| node)
    }

    /// Depth of the deepest expansion; 0 when nothing is expanded.
    pub fn depth(&self) -> usize {
        self.expand
            .iter()
            .map(|(_, node)| node.depth() + 1)
            .max()
            .unwrap_or(0)
    }

    fn add_field(&mut self, name: &'static str) {
        if !self.fields.contains(&name) {
            self.fields.push(name);
        }
    }

    fn child(&mut self, name: &'static str) -> &mut SelectExpandNode {
        let index = match self.expand.iter().position(|(n, _)| *n == name) {
            Some(index) => index,
            None => {
                self.expand.push((name, SelectExpandNode::default()));
                self.expand.len() - 1
            }
        };
        &mut self.expand[index].1
    }
}

impl fmt::Display for SelectExpandNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for field in &self.fields {
            if !first {
                f.write_str(",")?;
            }
            first = false;
            f.write_str(field)?;
        }
        for (name, node) in &self.expand {
            if !first {
                f.write_str(",")?;
            }
            first = false;
            f.write_str(name)?;
            if !node.is_default() {
                write!(f, "({node})")?;
            }
        }
        Ok(())
    }
}

/// The merged `select`/`expand` option.
///
/// Omitting both selects every scalar field and expands nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectExpandOption {
    root: SelectExpandNode,
}

impl SelectExpandOption {
    pub const SELECT: &'static str = "select";
    pub const EXPAND: &'static str = "expand";

    pub fn parse(
        meta: &'static RecordMetadata,
        select: Option<&str>,
        expand: Option<&str>,
        config: &QueryConfig,
    ) -> Result<Self, BadRequest> {
        let mut root = SelectExpandNode::default();
        let mut errors = BadRequest::new();
        for (parameter, raw) in [(Self::SELECT, select), (Self::EXPAND, expand)] {
            let Some(text) = raw.filter(|s| !s.trim().is_empty()) else {
                continue;
            };
            let mut parser = ListParser {
                parameter,
                input: text,
                pos: 0,
                max_depth: config.max_expansion_depth,
                errors: Vec::new(),
            };
            if let Err(syntax) = parser.parse_root(meta, &mut root) {
                parser.errors.push(syntax);
            }
            errors.extend(parser.errors.into());
        }
        errors.into_result()?;
        Ok(Self { root })
    }

    pub fn from_node(root: SelectExpandNode) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &SelectExpandNode {
        &self.root
    }

    pub fn is_default(&self) -> bool {
        self.root.is_default()
    }
}

impl fmt::Display for SelectExpandOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.root.fmt(f)
    }
}

struct ListParser<'a> {
    parameter: &'static str,
    input: &'a str,
    pos: usize,
    max_depth: usize,
    /// Field-level errors; parsing continues past them.
    errors: Vec<ParameterError>,
}

impl<'a> ListParser<'a> {
    fn parse_root(
        &mut self,
        meta: &'static RecordMetadata,
        root: &mut SelectExpandNode,
    ) -> Result<(), ParameterError> {
        self.list(meta, root, 0, "")?;
        self.skip_whitespace();
        match self.peek() {
            None => Ok(()),
            Some(_) => Err(self.syntax("unbalanced ')'")),
        }
    }

    fn list(
        &mut self,
        meta: &'static RecordMetadata,
        node: &mut SelectExpandNode,
        depth: usize,
        prefix: &str,
    ) -> Result<(), ParameterError> {
        loop {
            self.item(meta, node, depth, prefix)?;
            self.skip_whitespace();
            match self.peek() {
                Some(b',') => self.pos += 1,
                None | Some(b')') => return Ok(()),
                Some(_) => return Err(self.syntax("expected ',' or ')'")),
            }
        }
    }

    fn item(
        &mut self,
        meta: &'static RecordMetadata,
        node: &mut SelectExpandNode,
        depth: usize,
        prefix: &str,
    ) -> Result<(), ParameterError> {
        self.skip_whitespace();
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'.')
        {
            self.pos += 1;
        }
        let input = self.input;
        let path = &input[start..self.pos];
        if path.is_empty() {
            return Err(self.syntax("expected a field name"));
        }
        self.skip_whitespace();
        let nested = self.peek() == Some(b'(');
        if nested {
            self.pos += 1;
        }

        match self.resolve(meta, node, depth, prefix, path, start) {
            Ok(Some((target, child, child_depth, child_prefix))) if nested => {
                self.list(target, child, child_depth, &child_prefix)?;
                self.close()?;
            }
            Ok(Some(_)) | Ok(None) if !nested => {}
            Ok(_) => return Err(self.syntax(format!("'{path}' is not a relation"))),
            Err(error) => {
                self.errors.push(error);
                if nested {
                    self.skip_group()?;
                }
            }
        }
        Ok(())
    }

    /// Applies `path` to `node`, returning the innermost relation when the
    /// path ends on one.
    #[allow(clippy::type_complexity)]
    fn resolve<'n>(
        &self,
        meta: &'static RecordMetadata,
        node: &'n mut SelectExpandNode,
        depth: usize,
        prefix: &str,
        path: &str,
        position: usize,
    ) -> Result<Option<(&'static RecordMetadata, &'n mut SelectExpandNode, usize, String)>, ParameterError>
    {
        let error = |e: QueryError| ParameterError::new(self.parameter, e).at(position);
        let full = join(prefix, path);

        let mut meta = meta;
        let mut node = node;
        let mut depth = depth;
        let mut walked = prefix.to_string();
        let mut segments = path.split('.').peekable();
        while let Some(segment) = segments.next() {
            let last = segments.peek().is_none();
            let field = meta
                .field(segment)
                .ok_or_else(|| error(QueryError::unknown_field(full.clone())))?;
            walked = join(&walked, segment);

            match field.relation() {
                None if last => {
                    node.add_field(field.name());
                    return Ok(None);
                }
                None => return Err(error(QueryError::unknown_field(full))),
                Some(relation) => {
                    depth += 1;
                    if depth > self.max_depth {
                        return Err(error(QueryError::ExpansionTooDeep {
                            path: walked,
                            max_depth: self.max_depth,
                        }));
                    }
                    meta = relation.target();
                    node = node.child(field.name());
                }
            }
        }
        Ok(Some((meta, node, depth, walked)))
    }

    fn close(&mut self) -> Result<(), ParameterError> {
        self.skip_whitespace();
        if self.peek() == Some(b')') {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.syntax("expected ')'"))
        }
    }

    fn skip_group(&mut self) -> Result<(), ParameterError> {
        let mut open = 1usize;
        while let Some(b) = self.peek() {
            self.pos += 1;
            match b {
                b'(' => open += 1,
                b')' => {
                    open -= 1;
                    if open == 0 {
                        return Ok(());
                    }
                }
                _ => {}
            }
        }
        Err(self.syntax("expected ')'"))
    }

    fn peek(&self) -> Option<u8> {
        self.input.as_bytes().get(self.pos).copied()
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(|b| b.is_ascii_whitespace()) {
            self.pos += 1;
        }
    }

    fn syntax(&self, reason: impl Into<String>) -> ParameterError {
        ParameterError::new(self.parameter, QueryError::parse(self.pos, reason)).at(self.pos)
    }
}

fn join(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}.{name}")
    }
}
