//! `%(name)s` substitution templates.
//!
//! A template is parsed once into literal and reference segments. `%%`
//! renders a literal `%`; any other `%` that does not open a `%(name)s`
//! reference is rejected at parse time.

use std::fmt;

use golem_core::{GolemError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Ref(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    source: String,
    segments: Vec<Segment>,
}

impl Template {
    pub fn parse(source: &str) -> Result<Self> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = source.char_indices().peekable();

        while let Some((i, c)) = chars.next() {
            if c != '%' {
                literal.push(c);
                continue;
            }
            match chars.peek().map(|&(_, c)| c) {
                Some('%') => {
                    chars.next();
                    literal.push('%');
                }
                Some('(') => {
                    let rest = &source[i + 2..];
                    let close = rest.find(")s").ok_or_else(|| {
                        GolemError::Config(format!("unterminated tag reference in '{source}'"))
                    })?;
                    let name = &rest[..close];
                    if name.is_empty() || name.contains(['(', ')', '%']) {
                        return Err(GolemError::Config(format!(
                            "invalid tag reference '%({name})s' in '{source}'"
                        )));
                    }
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Ref(name.to_string()));
                    // skip "(name)s"
                    let end = i + 2 + close + 2;
                    while chars.peek().is_some_and(|&(j, _)| j < end) {
                        chars.next();
                    }
                }
                _ => {
                    return Err(GolemError::Config(format!(
                        "stray '%' at offset {i} in '{source}'"
                    )))
                }
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }
        Ok(Self {
            source: source.to_string(),
            segments,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Referenced tag names in order of appearance (may repeat).
    pub fn references(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Ref(name) => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }

    pub fn is_literal(&self) -> bool {
        self.references().next().is_none()
    }

    /// Substitute every reference with the text `lookup` returns for it.
    pub fn render<F>(&self, mut lookup: F) -> Result<String>
    where
        F: FnMut(&str) -> Result<String>,
    {
        let mut out = String::with_capacity(self.source.len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Ref(name) => out.push_str(&lookup(name)?),
            }
        }
        Ok(out)
    }

    /// Replace only the references `lookup` knows, keeping the others as
    /// `%(name)s`. Used to inline user tags before loop expansion.
    pub fn partial<F>(&self, mut lookup: F) -> Result<Template>
    where
        F: FnMut(&str) -> Result<Option<String>>,
    {
        let mut text = String::with_capacity(self.source.len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(t) => text.push_str(&t.replace('%', "%%")),
                Segment::Ref(name) => match lookup(name)? {
                    Some(value) => text.push_str(&value.replace('%', "%%")),
                    None => {
                        text.push_str("%(");
                        text.push_str(name);
                        text.push_str(")s");
                    }
                },
            }
        }
        Template::parse(&text)
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_references_and_literals() {
        let t = Template::parse("result/%(golem_bin_iso)s.%(sensor)s.out").unwrap();
        let refs: Vec<_> = t.references().collect();
        assert_eq!(refs, vec!["golem_bin_iso", "sensor"]);
        assert!(!t.is_literal());
        assert!(Template::parse("plain/path.txt").unwrap().is_literal());
    }

    #[test]
    fn renders_with_lookup() {
        let t = Template::parse("a/%(x)s-%(y)s/%%d").unwrap();
        let out = t
            .render(|name| Ok(name.to_uppercase()))
            .unwrap();
        assert_eq!(out, "a/X-Y/%d");
    }

    #[test]
    fn lookup_errors_propagate() {
        let t = Template::parse("%(missing)s").unwrap();
        let err = t
            .render(|name| Err(GolemError::Config(format!("unknown tag {name}"))))
            .unwrap_err();
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn rejects_bad_syntax() {
        assert!(Template::parse("50%").is_err());
        assert!(Template::parse("%(open").is_err());
        assert!(Template::parse("%()s").is_err());
        assert!(Template::parse("%d").is_err());
    }

    #[test]
    fn partial_keeps_unknown_refs() {
        let t = Template::parse("%(prefix)s-%(sensor)s 100%%").unwrap();
        let p = t
            .partial(|name| Ok((name == "prefix").then(|| "flows".to_string())))
            .unwrap();
        assert_eq!(p.source(), "flows-%(sensor)s 100%%");
        assert_eq!(p.references().collect::<Vec<_>>(), vec!["sensor"]);
    }
}
