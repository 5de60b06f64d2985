use std::collections::HashMap;

/// Quotes identifiers for use in generated DDL, leaving plain lowercase names alone.
#[derive(Debug, Default)]
pub struct IdentifierQuoter {
    keywords: HashMap<String, AllowedKeywordUsage>,
}

/// Where a keyword may appear without quoting.
#[derive(Debug, Copy, Clone)]
pub struct AllowedKeywordUsage {
    pub column_name: bool,
    pub type_or_function_name: bool,
}

/// The position an identifier is being written into.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum AttemptedKeywordUsage {
    ColumnName,
    TypeOrFunctionName,
    Other,
}

impl IdentifierQuoter {
    pub fn new(keywords: HashMap<String, AllowedKeywordUsage>) -> Self {
        Self { keywords }
    }

    /// A quoter that knows no keywords. Only quotes names that are not plain lowercase identifiers.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn quote(&self, identifier: impl AsRef<str>, usage: AttemptedKeywordUsage) -> String {
        let identifier = identifier.as_ref();

        if identifier.is_empty() {
            return "\"\"".to_string();
        }

        let safe = match self.keywords.get(identifier) {
            Some(allowed) => match usage {
                AttemptedKeywordUsage::ColumnName => allowed.column_name,
                AttemptedKeywordUsage::TypeOrFunctionName => allowed.type_or_function_name,
                AttemptedKeywordUsage::Other => false,
            },
            None => {
                let mut chars = identifier.chars();
                matches!(chars.next(), Some('a'..='z' | '_'))
                    && chars.all(|c| matches!(c, 'a'..='z' | '0'..='9' | '_'))
            }
        };

        if safe {
            identifier.to_string()
        } else {
            format!("\"{}\"", identifier.replace('"', "\"\""))
        }
    }

    /// Quotes `schema.name`.
    pub fn quote_qualified(&self, schema: &str, name: &str) -> String {
        format!(
            "{}.{}",
            self.quote(schema, AttemptedKeywordUsage::Other),
            self.quote(name, AttemptedKeywordUsage::Other)
        )
    }

    /// Collation names are always quoted, as they are commonly mixed case or contain dots.
    pub fn quote_collation(&self, collation: &str) -> String {
        format!("\"{}\"", collation.replace('"', "\"\""))
    }
}

pub(crate) trait Quotable {
    fn quote(&self, quoter: &IdentifierQuoter, usage: AttemptedKeywordUsage) -> String;
}

impl<S> Quotable for S
where
    S: AsRef<str>,
{
    fn quote(&self, quoter: &IdentifierQuoter, usage: AttemptedKeywordUsage) -> String {
        quoter.quote(self, usage)
    }
}

pub(crate) trait QuotableIter: Sized {
    fn quote(self, quoter: &IdentifierQuoter, usage: AttemptedKeywordUsage)
        -> IteratorQuoter<'_, Self>;
}

impl<I> QuotableIter for I
where
    I: Iterator,
    I::Item: AsRef<str>,
{
    fn quote(
        self,
        quoter: &IdentifierQuoter,
        usage: AttemptedKeywordUsage,
    ) -> IteratorQuoter<'_, Self> {
        IteratorQuoter {
            quoter,
            usage,
            iter: self,
        }
    }
}

pub(crate) struct IteratorQuoter<'q, I> {
    quoter: &'q IdentifierQuoter,
    usage: AttemptedKeywordUsage,
    iter: I,
}

impl<I> Iterator for IteratorQuoter<'_, I>
where
    I: Iterator,
    I::Item: AsRef<str>,
{
    type Item = String;

    fn next(&mut self) -> Option<Self::Item> {
        self.iter.next().map(|i| self.quoter.quote(i, self.usage))
    }
}

/// Quotes a string literal.
pub(crate) fn quote_value_string(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}
