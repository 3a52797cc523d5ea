use crate::config::ColumnRef;

/// A sheet as read from the spreadsheet: header row plus untyped cells.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    /// Header row, verbatim. Blank header cells are named `Unnamed: N`.
    pub headers: Vec<String>,
    /// Data rows below the header; `None` is an empty cell. Rows may be
    /// shorter than `headers` when trailing cells are empty.
    pub rows: Vec<Vec<Option<String>>>,
}

impl RawTable {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<Option<String>>>) -> Self {
        Self { headers, rows }
    }

    /// Resolve a configured column reference to its position.
    pub fn column_index(&self, column: &ColumnRef) -> Option<usize> {
        match column {
            ColumnRef::Position(i) if *i < self.headers.len() => Some(*i),
            ColumnRef::Position(_) => None,
            ColumnRef::Header(name) => self.headers.iter().position(|h| h == name),
        }
    }

    pub fn cell(&self, row: usize, col: usize) -> Option<&str> {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .and_then(|c| c.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_headers_and_positions() {
        let t = RawTable::new(
            vec!["UF".into(), "Código da Escola".into(), "Unnamed: 2".into()],
            vec![vec![Some("RO".into()), Some("11000058.0".into())]],
        );
        assert_eq!(t.column_index(&ColumnRef::Header("Código da Escola".into())), Some(1));
        assert_eq!(t.column_index(&ColumnRef::Position(2)), Some(2));
        assert_eq!(t.column_index(&ColumnRef::Position(3)), None);
        assert_eq!(t.column_index(&ColumnRef::Header("IDEB".into())), None);
        assert_eq!(t.cell(0, 1), Some("11000058.0"));
        assert_eq!(t.cell(0, 2), None);
    }
}
