//! Text templates with `{expression}` placeholders
//!
//! `{t:key}` looks up a learned translation in the speaker's language and
//! `{line:category}` picks one of the speaker's scripted lines. `{{` and
//! `}}` produce literal braces.

use serde_json::Value;

use crate::triggers::context::display_value;
use crate::triggers::expression::{Expr, ParseError};

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Literal(String),
    Expr(Expr),
    Translate(String),
    Line(String),
}

/// Supplies translations and scripted lines while rendering
pub trait Resolver {
    fn translate(&mut self, key: &str) -> Option<String>;
    fn line(&mut self, category: &str) -> Option<String>;
}

/// Resolver for contexts without a speaker
pub struct NoResolver;

impl Resolver for NoResolver {
    fn translate(&mut self, _key: &str) -> Option<String> {
        None
    }

    fn line(&mut self, _category: &str) -> Option<String> {
        None
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Rendered {
    pub text: String,
    /// Placeholders that failed to evaluate or resolve
    pub unresolved: usize,
}

impl Rendered {
    /// Non-empty and every placeholder resolved
    pub fn is_complete(&self) -> bool {
        self.unresolved == 0 && !self.text.trim().is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    segments: Vec<Segment>,
}

impl Template {
    pub fn parse(source: &str) -> Result<Template, ParseError> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = source.char_indices().peekable();

        while let Some((pos, c)) = chars.next() {
            match c {
                '{' if matches!(chars.peek(), Some((_, '{'))) => {
                    chars.next();
                    literal.push('{');
                }
                '}' if matches!(chars.peek(), Some((_, '}'))) => {
                    chars.next();
                    literal.push('}');
                }
                '{' => {
                    let rest = &source[pos + 1..];
                    let end = rest.find('}').ok_or_else(|| ParseError {
                        message: format!("unclosed placeholder in '{}'", source),
                    })?;
                    let inner = rest[..end].trim();
                    // Skip the placeholder body and its closing brace
                    for _ in 0..rest[..=end].chars().count() {
                        chars.next();
                    }

                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(parse_placeholder(inner)?);
                }
                _ => literal.push(c),
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }
        Ok(Template { segments })
    }

    /// Template that renders `text` verbatim
    pub fn literal(text: &str) -> Template {
        Template {
            segments: vec![Segment::Literal(text.to_string())],
        }
    }

    pub fn is_static(&self) -> bool {
        self.segments.iter().all(|s| matches!(s, Segment::Literal(_)))
    }

    /// The expression if the template is exactly one `{expr}` placeholder
    pub fn single_expr(&self) -> Option<&Expr> {
        match self.segments.as_slice() {
            [Segment::Expr(expr)] => Some(expr),
            _ => None,
        }
    }

    pub fn render(&self, ctx: &Value, resolver: &mut dyn Resolver) -> Rendered {
        let mut text = String::new();
        let mut unresolved = 0;
        for segment in &self.segments {
            let piece = match segment {
                Segment::Literal(s) => Some(s.clone()),
                Segment::Expr(expr) => expr
                    .evaluate(ctx)
                    .ok()
                    .filter(|v| !v.is_null())
                    .map(|v| display_value(&v)),
                Segment::Translate(key) => resolver.translate(key),
                Segment::Line(category) => resolver.line(category),
            };
            match piece {
                Some(p) => text.push_str(&p),
                None => unresolved += 1,
            }
        }
        Rendered { text, unresolved }
    }

    /// Resolve to a JSON value: a lone `{expr}` keeps its type
    pub fn resolve_value(&self, ctx: &Value, resolver: &mut dyn Resolver) -> Value {
        if let Some(expr) = self.single_expr() {
            return expr.evaluate(ctx).unwrap_or(Value::Null);
        }
        Value::String(self.render(ctx, resolver).text)
    }
}

fn parse_placeholder(inner: &str) -> Result<Segment, ParseError> {
    if let Some(key) = inner.strip_prefix("t:") {
        return Ok(Segment::Translate(key.trim().to_string()));
    }
    if let Some(category) = inner.strip_prefix("line:") {
        return Ok(Segment::Line(category.trim().to_string()));
    }
    Expr::parse(inner).map(Segment::Expr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Dictionary;

    impl Resolver for Dictionary {
        fn translate(&mut self, key: &str) -> Option<String> {
            (key == "hello").then(|| "bonjour".to_string())
        }

        fn line(&mut self, category: &str) -> Option<String> {
            (category == "greeting").then(|| "well met".to_string())
        }
    }

    #[test]
    fn test_render_expressions() {
        let template = Template::parse("I feel {emotion.label} ({round(emotion.valence * 10)})").unwrap();
        let ctx = json!({"emotion": {"label": "sad", "valence": -0.62}});
        let rendered = template.render(&ctx, &mut NoResolver);
        assert_eq!(rendered.text, "I feel sad (-6)");
        assert!(rendered.is_complete());
    }

    #[test]
    fn test_missing_value_counts_unresolved() {
        let template = Template::parse("hi {speaker}").unwrap();
        let rendered = template.render(&json!({}), &mut NoResolver);
        assert_eq!(rendered.text, "hi ");
        assert_eq!(rendered.unresolved, 1);
        assert!(!rendered.is_complete());
    }

    #[test]
    fn test_translation_and_lines() {
        let template = Template::parse("{t:hello}, {line:greeting}! {t:bye}").unwrap();
        let rendered = template.render(&json!({}), &mut Dictionary);
        assert_eq!(rendered.text, "bonjour, well met! ");
        assert_eq!(rendered.unresolved, 1);
    }

    #[test]
    fn test_escaped_braces() {
        let template = Template::parse("{{literal}} {1 + 1}").unwrap();
        assert_eq!(template.render(&json!({}), &mut NoResolver).text, "{literal} 2");
    }

    #[test]
    fn test_static_and_single_expr() {
        assert!(Template::parse("plain words").unwrap().is_static());
        let single = Template::parse("{emotion.valence}").unwrap();
        assert!(single.single_expr().is_some());
        let value = single.resolve_value(&json!({"emotion": {"valence": 0.5}}), &mut NoResolver);
        assert_eq!(value, json!(0.5));
        let mixed = Template::parse("v={emotion.valence}").unwrap();
        assert!(mixed.single_expr().is_none());
    }

    #[test]
    fn test_parse_errors() {
        assert!(Template::parse("oops {unclosed").is_err());
        assert!(Template::parse("bad {1 +}").is_err());
    }
}
