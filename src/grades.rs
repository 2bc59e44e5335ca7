use std::collections::BTreeMap;
use std::path::Path;

use calamine::{Data, Range, Reader, Xlsx, open_workbook};
use log::{debug, info};

use crate::error::Error;

/// A worksheet as a header row plus data rows of display strings.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// One student's row with the raw column labels mapped to semantic keys.
#[derive(Clone, Debug, PartialEq)]
pub struct StudentRecord {
    pub name: String,
    pub grades: BTreeMap<String, String>,
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.trim().to_string(),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        other => other.to_string(),
    }
}

pub fn table_from_range(range: &Range<Data>) -> Table {
    let mut rows = range
        .rows()
        .map(|row| row.iter().map(cell_text).collect::<Vec<_>>())
        .filter(|row| row.iter().any(|c| !c.is_empty()));
    let headers = rows.next().unwrap_or_default();
    Table { headers, rows: rows.collect() }
}

fn open(path: &Path) -> Result<Xlsx<std::io::BufReader<std::fs::File>>, Error> {
    if !path.is_file() {
        return Err(Error::SourceNotFound(path.to_path_buf()));
    }
    Ok(open_workbook(path)?)
}

/// Logs every sheet's name and size, as a quick sanity check of the input.
pub fn workbook_info(path: &Path) -> Result<Vec<(String, usize, usize)>, Error> {
    let mut workbook = open(path)?;
    let mut info = Vec::new();
    for name in workbook.sheet_names() {
        let (rows, cols) = workbook.worksheet_range(&name)?.get_size();
        info!("  {name:?}: {rows} rows x {cols} columns");
        info.push((name, rows, cols));
    }
    Ok(info)
}

/// Reads `sheet` (default: the first one) into a [`Table`].
pub fn read_table(path: &Path, sheet: Option<&str>) -> Result<Table, Error> {
    let mut workbook = open(path)?;
    let names = workbook.sheet_names();
    let name = match sheet {
        Some(wanted) => names.iter().find(|n| n.as_str() == wanted).cloned().ok_or_else(|| {
            Error::Config(format!("sheet {wanted:?} not found in {}", path.display()))
        })?,
        None => names
            .first()
            .cloned()
            .ok_or_else(|| Error::Sheet(format!("{} has no worksheets", path.display())))?,
    };
    let range = workbook.worksheet_range(&name)?;
    let table = table_from_range(&range);
    debug!("Read sheet {name:?}: {} columns, {} rows", table.headers.len(), table.rows.len());
    Ok(table)
}

impl Table {
    fn column(&self, label: &str) -> Result<usize, Error> {
        let label = label.trim();
        self.headers
            .iter()
            .position(|h| h == label)
            .or_else(|| self.headers.iter().position(|h| h.to_lowercase() == label.to_lowercase()))
            .ok_or_else(|| Error::Config(format!("column {label:?} not found in table")))
    }

    /// One record per row that has a student name.
    pub fn records(
        &self,
        student_column: &str,
        mapping: &BTreeMap<String, String>,
    ) -> Result<Vec<StudentRecord>, Error> {
        let name_col = self.column(student_column)?;
        let columns = mapping
            .iter()
            .map(|(key, label)| Ok((key.clone(), self.column(label)?)))
            .collect::<Result<Vec<_>, Error>>()?;

        Ok(self
            .rows
            .iter()
            .filter_map(|row| {
                let name = row.get(name_col).map(|n| n.trim()).unwrap_or_default();
                if name.is_empty() {
                    return None;
                }
                let grades = columns
                    .iter()
                    .map(|(key, col)| (key.clone(), row.get(*col).cloned().unwrap_or_default()))
                    .collect();
                Some(StudentRecord { name: name.to_string(), grades })
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Range<Data> {
        let mut range = Range::new((0, 0), (3, 2));
        range.set_value((0, 0), Data::String("Estudiant".into()));
        range.set_value((0, 1), Data::String("James Rizzi ".into()));
        range.set_value((0, 2), Data::String("Copia paraules de la pissarra".into()));
        range.set_value((1, 0), Data::String(" Anna ".into()));
        range.set_value((1, 1), Data::Float(3.0));
        range.set_value((1, 2), Data::String("AS".into()));
        range.set_value((3, 0), Data::String("Pau".into()));
        range.set_value((3, 1), Data::Float(2.5));
        range
    }

    #[test]
    fn skips_blank_rows_and_formats_numbers() {
        let table = table_from_range(&sample());
        assert_eq!(table.headers[1], "James Rizzi");
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0], vec!["Anna", "3", "AS"]);
        assert_eq!(table.rows[1], vec!["Pau", "2.5", ""]);
    }

    #[test]
    fn maps_columns_to_semantic_keys() {
        let table = table_from_range(&sample());
        let mapping = BTreeMap::from([
            ("james_rizzi".to_string(), "James Rizzi".to_string()),
            ("copies_from_board".to_string(), "copia paraules de la pissarra".to_string()),
        ]);
        let records = table.records("Estudiant", &mapping).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].name, "Anna");
        assert_eq!(records[0].grades["james_rizzi"], "3");
        assert_eq!(records[0].grades["copies_from_board"], "AS");
        assert_eq!(records[1].grades["copies_from_board"], "");
    }

    #[test]
    fn unknown_column_is_a_config_error() {
        let table = table_from_range(&sample());
        let mapping = BTreeMap::from([("x".to_string(), "Missing".to_string())]);
        assert!(matches!(table.records("Estudiant", &mapping), Err(Error::Config(_))));
        assert!(matches!(table.records("Nom", &BTreeMap::new()), Err(Error::Config(_))));
    }
}
