//! Import template: the catalogue's display headers plus one example row.

use std::io::Write;

use crate::mapping::CATALOGUE;

/// Write the template as CSV.
pub fn write_template<W: Write>(writer: W) -> csv::Result<()> {
    let mut out = csv::Writer::from_writer(writer);
    out.write_record(CATALOGUE.iter().map(|spec| spec.display))?;
    out.write_record(CATALOGUE.iter().map(|spec| spec.example))?;
    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::{map_columns, resolve_header};
    use reportkit_tabular::{TabularKind, read_table};

    fn template() -> Vec<u8> {
        let mut buf = Vec::new();
        write_template(&mut buf).unwrap();
        buf
    }

    #[test]
    fn headers_are_display_names() {
        let text = String::from_utf8(template()).unwrap();
        let header = text.lines().next().unwrap();
        assert!(header.starts_with("Report Title,Report Code,Category"));
        for spec in CATALOGUE {
            assert!(header.contains(spec.display));
            assert_eq!(resolve_header(spec.display).map(|s| s.name), Some(spec.name));
        }
    }

    #[test]
    fn template_reads_back_as_one_row() {
        let bytes = template();
        let table = read_table(&bytes, TabularKind::Delimited, 1024 * 1024).unwrap();
        assert_eq!(table.rows.len(), 1);

        let mapping = map_columns(&table.headers).unwrap();
        assert_eq!(mapping.columns.len(), CATALOGUE.len());
        assert!(mapping.unmapped.is_empty());
        assert!(mapping.shadowed.is_empty());
    }
}
