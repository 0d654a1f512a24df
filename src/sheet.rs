use anyhow::{anyhow, Context};
use chrono::Utc;
use std::fs::File;
use std::io::{Read, Seek, Write};
use std::path::Path;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

const CONTENT_TYPES_ENTRY: &str = "[Content_Types].xml";
const ROOT_RELS_ENTRY: &str = "_rels/.rels";
const CORE_PROPS_ENTRY: &str = "docProps/core.xml";
const WORKBOOK_ENTRY: &str = "xl/workbook.xml";
const WORKBOOK_RELS_ENTRY: &str = "xl/_rels/workbook.xml.rels";
const FIRST_SHEET_ENTRY: &str = "xl/worksheets/sheet1.xml";
const SHARED_STRINGS_ENTRY: &str = "xl/sharedStrings.xml";

pub const SHEET_NAME: &str = "Students";

const CONTENT_TYPES_XML: &str = concat!(
    "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n",
    "<Types xmlns=\"http://schemas.openxmlformats.org/package/2006/content-types\">",
    "<Default Extension=\"rels\" ContentType=\"application/vnd.openxmlformats-package.relationships+xml\"/>",
    "<Default Extension=\"xml\" ContentType=\"application/xml\"/>",
    "<Override PartName=\"/xl/workbook.xml\" ContentType=\"application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml\"/>",
    "<Override PartName=\"/xl/worksheets/sheet1.xml\" ContentType=\"application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml\"/>",
    "<Override PartName=\"/docProps/core.xml\" ContentType=\"application/vnd.openxmlformats-package.core-properties+xml\"/>",
    "</Types>"
);

const ROOT_RELS_XML: &str = concat!(
    "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n",
    "<Relationships xmlns=\"http://schemas.openxmlformats.org/package/2006/relationships\">",
    "<Relationship Id=\"rId1\" Type=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument\" Target=\"xl/workbook.xml\"/>",
    "<Relationship Id=\"rId2\" Type=\"http://schemas.openxmlformats.org/package/2006/relationships/metadata/core-properties\" Target=\"docProps/core.xml\"/>",
    "</Relationships>"
);

const WORKBOOK_RELS_XML: &str = concat!(
    "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n",
    "<Relationships xmlns=\"http://schemas.openxmlformats.org/package/2006/relationships\">",
    "<Relationship Id=\"rId1\" Type=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet\" Target=\"worksheets/sheet1.xml\"/>",
    "</Relationships>"
);

#[derive(Debug, Clone)]
pub struct SheetWriteSummary {
    pub rows_written: usize,
}

/// Writes `rows` as a single-worksheet xlsx container at `out_path`. Every
/// cell is an inline string with XML escaping, so values (CGPA included)
/// round-trip as text.
pub fn write_sheet(out_path: &Path, rows: &[Vec<String>]) -> anyhow::Result<SheetWriteSummary> {
    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.to_string_lossy()))?;
    }
    let out_file = File::create(out_path).with_context(|| {
        format!(
            "failed to create output file {}",
            out_path.to_string_lossy()
        )
    })?;
    let mut zip = ZipWriter::new(out_file);
    let opts = FileOptions::default().compression_method(CompressionMethod::Deflated);

    write_entry(&mut zip, CONTENT_TYPES_ENTRY, opts, CONTENT_TYPES_XML)?;
    write_entry(&mut zip, ROOT_RELS_ENTRY, opts, ROOT_RELS_XML)?;
    write_entry(&mut zip, CORE_PROPS_ENTRY, opts, &core_props_xml())?;
    write_entry(&mut zip, WORKBOOK_ENTRY, opts, &workbook_xml())?;
    write_entry(&mut zip, WORKBOOK_RELS_ENTRY, opts, WORKBOOK_RELS_XML)?;
    write_entry(&mut zip, FIRST_SHEET_ENTRY, opts, &worksheet_xml(rows))?;

    zip.finish().context("failed to finalize spreadsheet container")?;

    Ok(SheetWriteSummary {
        rows_written: rows.len(),
    })
}

/// Reads the first worksheet of an xlsx container back as rows of cells.
/// Handles the cell forms real spreadsheet tooling emits: inline strings,
/// shared strings, and plain values. Cell references place sparse cells in
/// the right columns; the gaps read as empty strings.
pub fn read_sheet(in_path: &Path) -> anyhow::Result<Vec<Vec<String>>> {
    let in_file = File::open(in_path)
        .with_context(|| format!("failed to open {}", in_path.to_string_lossy()))?;
    let mut archive = ZipArchive::new(in_file).context("not a spreadsheet container")?;

    let shared = if contains_entry(&archive, SHARED_STRINGS_ENTRY) {
        parse_shared_strings(&read_text_entry(&mut archive, SHARED_STRINGS_ENTRY)?)
    } else {
        Vec::new()
    };

    let sheet_entry = locate_first_sheet(&archive)?;
    let sheet_xml = read_text_entry(&mut archive, &sheet_entry)?;

    let mut rows = Vec::new();
    for row in scan_elements(&sheet_xml, "row") {
        let mut cells: Vec<String> = Vec::new();
        let mut next_col = 0usize;
        for c in scan_elements(&row.body, "c") {
            let col = attr_value(&c.attrs, "r")
                .map(|r| col_index(&r))
                .unwrap_or(next_col);
            if cells.len() <= col {
                cells.resize(col + 1, String::new());
            }
            cells[col] = cell_value(&c.attrs, &c.body, &shared);
            next_col = col + 1;
        }
        // Rows with no cell elements at all carry nothing worth keeping.
        if !cells.is_empty() {
            rows.push(cells);
        }
    }
    Ok(rows)
}

fn write_entry(
    zip: &mut ZipWriter<File>,
    name: &str,
    opts: FileOptions,
    contents: &str,
) -> anyhow::Result<()> {
    zip.start_file(name, opts)
        .with_context(|| format!("failed to start entry {name}"))?;
    zip.write_all(contents.as_bytes())
        .with_context(|| format!("failed to write entry {name}"))?;
    Ok(())
}

fn core_props_xml() -> String {
    let created = Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
    format!(
        concat!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n",
            "<cp:coreProperties xmlns:cp=\"http://schemas.openxmlformats.org/package/2006/metadata/core-properties\"",
            " xmlns:dc=\"http://purl.org/dc/elements/1.1/\" xmlns:dcterms=\"http://purl.org/dc/terms/\"",
            " xmlns:xsi=\"http://www.w3.org/2001/XMLSchema-instance\">",
            "<dc:creator>{creator}</dc:creator>",
            "<dcterms:created xsi:type=\"dcterms:W3CDTF\">{created}</dcterms:created>",
            "</cp:coreProperties>"
        ),
        creator = env!("CARGO_PKG_NAME"),
        created = created,
    )
}

fn workbook_xml() -> String {
    format!(
        concat!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n",
            "<workbook xmlns=\"http://schemas.openxmlformats.org/spreadsheetml/2006/main\"",
            " xmlns:r=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships\">",
            "<sheets><sheet name=\"{name}\" sheetId=\"1\" r:id=\"rId1\"/></sheets>",
            "</workbook>"
        ),
        name = xml_escape(SHEET_NAME),
    )
}

fn worksheet_xml(rows: &[Vec<String>]) -> String {
    let mut xml = String::from(concat!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n",
        "<worksheet xmlns=\"http://schemas.openxmlformats.org/spreadsheetml/2006/main\">",
        "<sheetData>"
    ));
    for (row_idx, row) in rows.iter().enumerate() {
        xml.push_str(&format!("<row r=\"{}\">", row_idx + 1));
        for (col_idx, cell) in row.iter().enumerate() {
            xml.push_str(&format!(
                "<c r=\"{}{}\" t=\"inlineStr\"><is><t>{}</t></is></c>",
                col_letters(col_idx),
                row_idx + 1,
                xml_escape(cell)
            ));
        }
        xml.push_str("</row>");
    }
    xml.push_str("</sheetData></worksheet>");
    xml
}

fn contains_entry<R: Read + Seek>(archive: &ZipArchive<R>, name: &str) -> bool {
    archive.file_names().any(|n| n == name)
}

fn locate_first_sheet<R: Read + Seek>(archive: &ZipArchive<R>) -> anyhow::Result<String> {
    if contains_entry(archive, FIRST_SHEET_ENTRY) {
        return Ok(FIRST_SHEET_ENTRY.to_string());
    }
    let mut candidates: Vec<String> = archive
        .file_names()
        .filter(|n| n.starts_with("xl/worksheets/") && n.ends_with(".xml"))
        .map(|n| n.to_string())
        .collect();
    candidates.sort();
    candidates
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("container has no worksheet"))
}

fn read_text_entry<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
) -> anyhow::Result<String> {
    let mut text = String::new();
    archive
        .by_name(name)
        .with_context(|| format!("container missing {name}"))?
        .read_to_string(&mut text)
        .with_context(|| format!("failed to read {name}"))?;
    Ok(text)
}

fn parse_shared_strings(xml: &str) -> Vec<String> {
    scan_elements(xml, "si")
        .into_iter()
        .map(|si| {
            // Concatenate text runs; plain strings have a single <t>.
            scan_elements(&si.body, "t")
                .into_iter()
                .map(|t| xml_unescape(&t.body))
                .collect::<String>()
        })
        .collect()
}

fn cell_value(attrs: &str, body: &str, shared: &[String]) -> String {
    match attr_value(attrs, "t").as_deref() {
        Some("inlineStr") => scan_elements(body, "t")
            .into_iter()
            .map(|t| xml_unescape(&t.body))
            .collect(),
        Some("s") => scan_elements(body, "v")
            .first()
            .and_then(|v| v.body.trim().parse::<usize>().ok())
            .and_then(|i| shared.get(i).cloned())
            .unwrap_or_default(),
        _ => scan_elements(body, "v")
            .first()
            .map(|v| xml_unescape(v.body.trim()))
            .unwrap_or_default(),
    }
}

struct XmlElement {
    attrs: String,
    body: String,
}

/// Collects non-nested `<tag ...>body</tag>` and `<tag .../>` occurrences.
/// Enough of a scanner for worksheet markup; there is no mixed content and
/// same-named elements never nest in the parts we read.
fn scan_elements(xml: &str, tag: &str) -> Vec<XmlElement> {
    let open = format!("<{tag}");
    let close = format!("</{tag}>");
    let mut out = Vec::new();
    let mut pos = 0usize;
    while let Some(found) = xml[pos..].find(&open) {
        let start = pos + found;
        let after = start + open.len();
        // Skip longer names sharing the prefix, e.g. <cols> when scanning <c>.
        match xml.as_bytes().get(after) {
            Some(b) if b.is_ascii_whitespace() || *b == b'>' || *b == b'/' => {}
            _ => {
                pos = after;
                continue;
            }
        }
        let Some(tag_end_rel) = xml[after..].find('>') else {
            break;
        };
        let tag_end = after + tag_end_rel;
        let self_closing = xml.as_bytes()[tag_end - 1] == b'/';
        let attrs = xml[after..tag_end].trim_end_matches('/').trim().to_string();
        if self_closing {
            out.push(XmlElement {
                attrs,
                body: String::new(),
            });
            pos = tag_end + 1;
            continue;
        }
        let body_start = tag_end + 1;
        let Some(close_rel) = xml[body_start..].find(&close) else {
            break;
        };
        out.push(XmlElement {
            attrs,
            body: xml[body_start..body_start + close_rel].to_string(),
        });
        pos = body_start + close_rel + close.len();
    }
    out
}

fn attr_value(attrs: &str, name: &str) -> Option<String> {
    let bytes = attrs.as_bytes();
    let pat = format!("{name}=");
    let mut search = 0usize;
    while let Some(found) = attrs[search..].find(&pat) {
        let at = search + found;
        let value_start = at + pat.len();
        let starts_token = at == 0 || bytes[at - 1].is_ascii_whitespace();
        if starts_token && value_start < attrs.len() {
            let quote = bytes[value_start];
            if quote == b'"' || quote == b'\'' {
                if let Some(end) = attrs[value_start + 1..].find(quote as char) {
                    return Some(attrs[value_start + 1..value_start + 1 + end].to_string());
                }
            }
        }
        search = value_start;
    }
    None
}

fn col_letters(col: usize) -> String {
    let mut out = String::new();
    let mut n = col + 1;
    while n > 0 {
        let rem = (n - 1) % 26;
        out.insert(0, (b'A' + rem as u8) as char);
        n = (n - 1) / 26;
    }
    out
}

/// Column index from an `A1`-style cell reference.
fn col_index(cell_ref: &str) -> usize {
    let mut col = 0usize;
    for ch in cell_ref.chars() {
        if ch.is_ascii_alphabetic() {
            col = col * 26 + (ch.to_ascii_uppercase() as usize - 'A' as usize + 1);
        } else {
            break;
        }
    }
    col.saturating_sub(1)
}

fn xml_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(ch),
        }
    }
    out
}

fn xml_unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        let Some(semi) = tail.find(';') else {
            out.push_str(tail);
            return out;
        };
        let entity = &tail[1..semi];
        match entity {
            "amp" => out.push('&'),
            "lt" => out.push('<'),
            "gt" => out.push('>'),
            "quot" => out.push('"'),
            "apos" => out.push('\''),
            _ => {
                let decoded = entity
                    .strip_prefix("#x")
                    .or_else(|| entity.strip_prefix("#X"))
                    .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                    .or_else(|| {
                        entity
                            .strip_prefix('#')
                            .and_then(|dec| dec.parse::<u32>().ok())
                    })
                    .and_then(char::from_u32);
                match decoded {
                    Some(c) => out.push(c),
                    None => {
                        // Unknown entity: keep it verbatim.
                        out.push_str(&tail[..=semi]);
                    }
                }
            }
        }
        rest = &tail[semi + 1..];
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_dir(prefix: &str) -> PathBuf {
        let p = std::env::temp_dir().join(format!(
            "{}-{}",
            prefix,
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .expect("clock")
                .as_nanos()
        ));
        std::fs::create_dir_all(&p).expect("create temp dir");
        p
    }

    fn strings(rows: &[Vec<&str>]) -> Vec<Vec<String>> {
        rows.iter()
            .map(|r| r.iter().map(|c| c.to_string()).collect())
            .collect()
    }

    #[test]
    fn write_then_read_round_trips_rows() {
        let dir = temp_dir("rosterd-sheet-roundtrip");
        let path = dir.join("students.xlsx");
        let rows = strings(&[
            vec!["Name", "ID", "Department", "Email", "CGPA"],
            vec!["Ann K", "S1", "CS", "a@x.com", "3.95"],
            vec!["Bo", "S2", "EE", "b@x.com", "3.5"],
        ]);

        let summary = write_sheet(&path, &rows).expect("write sheet");
        assert_eq!(summary.rows_written, 3);

        let back = read_sheet(&path).expect("read sheet");
        assert_eq!(back, rows);
    }

    #[test]
    fn markup_characters_survive_the_trip() {
        let dir = temp_dir("rosterd-sheet-escape");
        let path = dir.join("students.xlsx");
        let rows = strings(&[
            vec!["Name", "ID", "Department", "Email", "CGPA"],
            vec!["A & B <Ok>", "S\"1\"", "R'n'D", "a&b@x.com", "3.9"],
        ]);

        write_sheet(&path, &rows).expect("write sheet");
        assert_eq!(read_sheet(&path).expect("read sheet"), rows);
    }

    #[test]
    fn reads_shared_string_and_numeric_cells() {
        // The form Excel itself writes: strings interned in sharedStrings,
        // numeric cells as bare <v>.
        let dir = temp_dir("rosterd-sheet-sharedstrings");
        let path = dir.join("external.xlsx");

        let out = File::create(&path).expect("create file");
        let mut zip = ZipWriter::new(out);
        let opts = FileOptions::default().compression_method(CompressionMethod::Deflated);
        write_entry(&mut zip, CONTENT_TYPES_ENTRY, opts, CONTENT_TYPES_XML).expect("types");
        write_entry(&mut zip, ROOT_RELS_ENTRY, opts, ROOT_RELS_XML).expect("rels");
        write_entry(&mut zip, WORKBOOK_ENTRY, opts, &workbook_xml()).expect("workbook");
        write_entry(&mut zip, WORKBOOK_RELS_ENTRY, opts, WORKBOOK_RELS_XML).expect("wb rels");
        write_entry(
            &mut zip,
            SHARED_STRINGS_ENTRY,
            opts,
            concat!(
                "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n",
                "<sst xmlns=\"http://schemas.openxmlformats.org/spreadsheetml/2006/main\" count=\"3\" uniqueCount=\"3\">",
                "<si><t>Name</t></si>",
                "<si><r><t>An</t></r><r><t xml:space=\"preserve\">n</t></r></si>",
                "<si><t>a@x.com</t></si>",
                "</sst>"
            ),
        )
        .expect("shared strings");
        write_entry(
            &mut zip,
            FIRST_SHEET_ENTRY,
            opts,
            concat!(
                "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n",
                "<worksheet xmlns=\"http://schemas.openxmlformats.org/spreadsheetml/2006/main\"><sheetData>",
                "<row r=\"1\"><c r=\"A1\" t=\"s\"><v>0</v></c></row>",
                // Sparse row: B skipped entirely, E carries a number.
                "<row r=\"2\"><c r=\"A2\" t=\"s\"><v>1</v></c><c r=\"D2\" t=\"s\"><v>2</v></c><c r=\"E2\"><v>3.9</v></c></row>",
                "</sheetData></worksheet>"
            ),
        )
        .expect("sheet");
        zip.finish().expect("finish zip");

        let rows = read_sheet(&path).expect("read sheet");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], vec!["Name".to_string()]);
        assert_eq!(
            rows[1],
            vec![
                "Ann".to_string(),
                String::new(),
                String::new(),
                "a@x.com".to_string(),
                "3.9".to_string(),
            ]
        );
    }

    #[test]
    fn rejects_non_container_input() {
        let dir = temp_dir("rosterd-sheet-badfile");
        let path = dir.join("not-a-sheet.xlsx");
        std::fs::write(&path, b"name,id\nAnn,S1\n").expect("write junk");
        assert!(read_sheet(&path).is_err());
    }

    #[test]
    fn column_reference_math() {
        assert_eq!(col_letters(0), "A");
        assert_eq!(col_letters(4), "E");
        assert_eq!(col_letters(26), "AA");
        assert_eq!(col_index("A1"), 0);
        assert_eq!(col_index("E2"), 4);
        assert_eq!(col_index("AA10"), 26);
    }
}
