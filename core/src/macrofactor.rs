//! MacroFactor export parsing.
//!
//! Exports arrive either as an `.xlsx` workbook straight from the app or as
//! one CSV per sheet. Workbook sheets are recognised by name; a CSV's layout
//! is detected from its header row:
//!
//! - Quick Export: `Date, Expenditure, Trend Weight (kg), Weight (kg), Steps, Calories (kcal), Protein (g), Fat (g), Carbs (g)`
//! - Detailed Export, "Calories & Macros": `Date, Calories (kcal), Protein (g), Fat (g), Carbs (g)`
//! - Detailed Export, "Scale Weight": `Date, Weight (kg), Fat Percent`
//! - Program Settings: `Program Update Date, Program Weekday, Calories (kcal), Fat (g), Protein (g), Carbs (g), ...`
//!
//! Steps in the Quick Export are ignored; the wearable owns that column.

use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::{BufReader, Cursor, Read, Seek};
use std::path::Path;

use anyhow::{Context, Result, anyhow, bail};
use calamine::{Data, Reader, Xlsx};
use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::dates::{excel_serial_date, format_date, normalize_date};
use crate::models::{
    Field, FieldMap, Goal, IMPORT_LIMITS, Value, WEEKDAYS, drop_out_of_range, parse_weekday,
    round1,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportLayout {
    QuickExport,
    DetailedMacros,
    DetailedScaleWeight,
    ProgramSettings,
}

impl ExportLayout {
    /// Detect the layout from lower-cased headers.
    #[must_use]
    pub fn detect(headers: &[String]) -> Option<ExportLayout> {
        let has = |needle: &str| headers.iter().any(|h| h.contains(needle));
        if has("program weekday") || has("program update date") {
            Some(ExportLayout::ProgramSettings)
        } else if has("trend weight") || has("expenditure") || (has("calories") && has("weight"))
        {
            Some(ExportLayout::QuickExport)
        } else if has("calories") && has("date") {
            Some(ExportLayout::DetailedMacros)
        } else if has("weight") && has("date") {
            Some(ExportLayout::DetailedScaleWeight)
        } else {
            None
        }
    }

    /// Map a workbook sheet name to its layout. Other sheets are not ours to read.
    #[must_use]
    pub fn from_sheet_name(name: &str) -> Option<ExportLayout> {
        let name = name.trim().to_lowercase();
        if name.contains("quick export") {
            Some(ExportLayout::QuickExport)
        } else if name.contains("calories") && name.contains("macros") {
            Some(ExportLayout::DetailedMacros)
        } else if name.contains("scale weight") {
            Some(ExportLayout::DetailedScaleWeight)
        } else if name.contains("program settings") {
            Some(ExportLayout::ProgramSettings)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ExportLayout::QuickExport => "Quick Export",
            ExportLayout::DetailedMacros => "Detailed Export (Calories & Macros)",
            ExportLayout::DetailedScaleWeight => "Detailed Export (Scale Weight)",
            ExportLayout::ProgramSettings => "Program Settings",
        }
    }

    fn daily_columns(self) -> &'static [(&'static str, Field)] {
        match self {
            ExportLayout::QuickExport => &[
                ("expenditure", Field::Expenditure),
                ("trend weight", Field::TrendWeightKg),
                ("weight", Field::WeightKg),
                ("calories", Field::Calories),
                ("protein", Field::ProteinG),
                ("fat", Field::FatsG),
                ("carbs", Field::CarbsG),
            ],
            ExportLayout::DetailedMacros => &[
                ("calories", Field::Calories),
                ("protein", Field::ProteinG),
                ("fat", Field::FatsG),
                ("carbs", Field::CarbsG),
            ],
            ExportLayout::DetailedScaleWeight => &[
                ("fat percent", Field::FatPercent),
                ("weight", Field::WeightKg),
            ],
            ExportLayout::ProgramSettings => &[],
        }
    }
}

impl fmt::Display for ExportLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of parsing one or more export files.
#[derive(Debug, Clone, Default)]
pub struct ParsedExport {
    pub layouts: Vec<ExportLayout>,
    pub days: BTreeMap<NaiveDate, FieldMap>,
    pub goals: Vec<Goal>,
    pub warnings: Vec<String>,
}

impl ParsedExport {
    /// Fold `other` into `self`. Later files win per field on the same date.
    pub fn merge(&mut self, other: ParsedExport) {
        self.layouts.extend(other.layouts);
        for (date, fields) in other.days {
            self.days.entry(date).or_default().extend(fields);
        }
        if !other.goals.is_empty() {
            self.goals = other.goals;
        }
        self.warnings.extend(other.warnings);
    }

    #[must_use]
    pub fn nutrition_count(&self) -> usize {
        self.days
            .values()
            .filter(|f| f.contains_key(&Field::Calories))
            .count()
    }

    #[must_use]
    pub fn weight_count(&self) -> usize {
        self.days
            .values()
            .filter(|f| f.contains_key(&Field::WeightKg))
            .count()
    }
}

/// One sheet as text: lower-cased headers plus the data rows below them.
struct Sheet {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Sheet {
    fn from_rows(mut rows: impl Iterator<Item = Vec<String>>) -> Sheet {
        let headers = rows
            .next()
            .unwrap_or_default()
            .iter()
            .map(|h| h.trim().to_lowercase())
            .collect();
        Sheet {
            headers,
            rows: rows.collect(),
        }
    }
}

fn cell<'a>(row: &'a [String], idx: Option<usize>) -> Option<&'a str> {
    idx.and_then(|i| row.get(i)).map(String::as_str)
}

/// Map header patterns to column indices. Each header is claimed at most once,
/// so list specific patterns ("trend weight") before general ones ("weight").
fn map_columns<T: Copy>(headers: &[String], patterns: &[(&str, T)]) -> Vec<(T, usize)> {
    let mut claimed = vec![false; headers.len()];
    let mut out = Vec::new();
    for (pattern, target) in patterns {
        if let Some(i) = headers
            .iter()
            .enumerate()
            .position(|(i, h)| !claimed[i] && h.contains(pattern))
        {
            claimed[i] = true;
            out.push((*target, i));
        }
    }
    out
}

fn parse_number(raw: &str) -> Option<f64> {
    let s = raw.trim();
    if s.is_empty() || s.eq_ignore_ascii_case("n/a") {
        return None;
    }
    s.replace(',', "").parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Text dates first, then a bare Excel serial from an unformatted date cell.
fn parse_date(raw: &str) -> Option<NaiveDate> {
    normalize_date(raw).or_else(|| parse_number(raw).and_then(excel_serial_date))
}

fn cell_value(field: Field, raw: &str) -> Option<Value> {
    let n = parse_number(raw)?;
    Some(Value::Number(if field.is_integer() {
        n.trunc()
    } else {
        round1(n)
    }))
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty | Data::Error(_) => String::new(),
        Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
        Data::Int(n) => n.to_string(),
        Data::Float(f) => f.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => {
            let serial = dt.as_f64();
            excel_serial_date(serial).map_or_else(|| serial.to_string(), format_date)
        }
    }
}

fn parse_sheet(sheet: &Sheet, layout: ExportLayout) -> ParsedExport {
    if layout == ExportLayout::ProgramSettings {
        parse_program_settings(sheet)
    } else {
        parse_daily(sheet, layout)
    }
}

/// Parse a single export CSV from any reader.
pub fn parse_csv<R: Read>(reader: R) -> Result<ParsedExport> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);
    let mut rows = Vec::new();
    for (line, result) in rdr.records().enumerate() {
        let record = result.with_context(|| format!("Failed to parse CSV row {}", line + 1))?;
        rows.push(record.iter().map(str::to_string).collect::<Vec<_>>());
    }
    let sheet = Sheet::from_rows(rows.into_iter());

    let Some(layout) = ExportLayout::detect(&sheet.headers) else {
        bail!(
            "Unknown MacroFactor export. Expected a Quick Export, Calories & Macros, Scale Weight or Program Settings sheet; found columns: {}",
            sheet.headers.join(", ")
        );
    };
    info!(layout = %layout, "parsing MacroFactor export");
    Ok(parse_sheet(&sheet, layout))
}

/// Parse every recognised sheet of an `.xlsx` export.
pub fn parse_workbook<RS: Read + Seek>(reader: RS) -> Result<ParsedExport> {
    let mut workbook: Xlsx<RS> =
        Xlsx::new(reader).map_err(|e| anyhow!("Could not open workbook: {e}"))?;
    let names = workbook.sheet_names().to_vec();

    let mut parsed = ParsedExport::default();
    for name in &names {
        let Some(layout) = ExportLayout::from_sheet_name(name) else {
            debug!(sheet = %name, "skipping sheet");
            continue;
        };
        let range = workbook
            .worksheet_range(name)
            .map_err(|e| anyhow!("Could not read sheet '{name}': {e}"))?;
        let sheet = Sheet::from_rows(range.rows().map(|row| row.iter().map(cell_text).collect()));
        info!(sheet = %name, layout = %layout, rows = sheet.rows.len(), "parsing MacroFactor sheet");
        parsed.merge(parse_sheet(&sheet, layout));
    }

    if parsed.layouts.is_empty() {
        bail!(
            "Unknown MacroFactor export. Expected a Quick Export, Calories & Macros, Scale Weight or Program Settings sheet; found sheets: {}",
            names.join(", ")
        );
    }
    Ok(parsed)
}

fn is_workbook(file_name: &str) -> bool {
    let name = file_name.to_lowercase();
    name.ends_with(".xlsx") || name.ends_with(".xlsm")
}

/// Whether a file name looks like something [`parse_bytes`] can read.
#[must_use]
pub fn is_supported(file_name: &str) -> bool {
    is_workbook(file_name) || file_name.to_lowercase().ends_with(".csv")
}

/// Parse an in-memory export, choosing the reader from the file name.
pub fn parse_bytes(file_name: &str, bytes: &[u8]) -> Result<ParsedExport> {
    if is_workbook(file_name) {
        parse_workbook(Cursor::new(bytes))
    } else {
        parse_csv(bytes)
    }
}

pub fn parse_file(path: &Path) -> Result<ParsedExport> {
    let file =
        File::open(path).with_context(|| format!("Failed to open file: {}", path.display()))?;
    let parsed = if is_workbook(&path.to_string_lossy()) {
        parse_workbook(BufReader::new(file))
    } else {
        parse_csv(file)
    };
    parsed.with_context(|| format!("Could not parse {}", path.display()))
}

/// Parse and merge several exports in order. Later files win per field.
pub fn parse_files<P: AsRef<Path>>(paths: &[P]) -> Result<ParsedExport> {
    let mut parsed = ParsedExport::default();
    for path in paths {
        parsed.merge(parse_file(path.as_ref())?);
    }
    Ok(parsed)
}

fn parse_daily(sheet: &Sheet, layout: ExportLayout) -> ParsedExport {
    let date_idx = map_columns(&sheet.headers, &[("date", ())])
        .first()
        .map_or(0, |(_, i)| *i);
    let columns = map_columns(&sheet.headers, layout.daily_columns());

    let mut days: BTreeMap<NaiveDate, FieldMap> = BTreeMap::new();
    for row in &sheet.rows {
        let Some(date) = cell(row, Some(date_idx)).and_then(parse_date) else {
            continue;
        };
        let entry = days.entry(date).or_default();
        for (field, idx) in &columns {
            if let Some(value) = cell(row, Some(*idx)).and_then(|raw| cell_value(*field, raw)) {
                entry.insert(*field, Some(value));
            }
        }
    }

    let mut warnings = Vec::new();
    for (date, fields) in &mut days {
        warnings.extend(drop_out_of_range(*date, fields, &IMPORT_LIMITS));
    }
    days.retain(|_, fields| !fields.is_empty());

    let parsed = ParsedExport {
        layouts: vec![layout],
        days,
        goals: Vec::new(),
        warnings,
    };
    info!(
        layout = %layout,
        days = parsed.days.len(),
        nutrition = parsed.nutrition_count(),
        weight = parsed.weight_count(),
        "parsed daily export"
    );
    parsed
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum GoalColumn {
    UpdateDate,
    Weekday,
    Calories,
    Fat,
    Protein,
    Carbs,
    Weight,
}

#[allow(clippy::cast_possible_wrap, clippy::cast_sign_loss)]
fn parse_program_settings(sheet: &Sheet) -> ParsedExport {
    let columns = map_columns(
        &sheet.headers,
        &[
            ("program update date", GoalColumn::UpdateDate),
            ("program weekday", GoalColumn::Weekday),
            ("calories", GoalColumn::Calories),
            ("fat", GoalColumn::Fat),
            ("protein", GoalColumn::Protein),
            ("carbs", GoalColumn::Carbs),
            ("weight", GoalColumn::Weight),
        ],
    );
    let find = |col: GoalColumn, fallback: Option<usize>| {
        columns
            .iter()
            .find(|(c, _)| *c == col)
            .map(|(_, i)| *i)
            .or(fallback)
    };
    let date_idx = find(GoalColumn::UpdateDate, Some(0));
    let weekday_idx = find(GoalColumn::Weekday, Some(1));

    let mut latest: BTreeMap<i64, Goal> = BTreeMap::new();
    for (line, row) in sheet.rows.iter().enumerate() {
        let get = |col| cell(row, find(col, None));
        let int = |col| get(col).and_then(parse_number).map(|n| n.trunc() as i64);

        let Some(updated) = cell(row, date_idx).and_then(parse_date) else {
            continue;
        };
        let Some(day) = cell(row, weekday_idx).and_then(parse_weekday) else {
            warn!(row = line + 2, "skipping program row without a weekday");
            continue;
        };

        let goal = Goal {
            day_of_week: day,
            weekday: WEEKDAYS[day as usize].to_string(),
            target_calories: int(GoalColumn::Calories),
            target_protein_g: int(GoalColumn::Protein),
            target_carbs_g: int(GoalColumn::Carbs),
            target_fats_g: int(GoalColumn::Fat),
            target_weight_kg: get(GoalColumn::Weight).and_then(parse_number),
            last_updated: updated,
        };
        match latest.get(&day) {
            Some(existing) if existing.last_updated >= updated => {}
            _ => {
                latest.insert(day, goal);
            }
        }
    }

    let goals: Vec<Goal> = latest.into_values().collect();
    info!(weekdays = goals.len(), "parsed program settings");
    ParsedExport {
        layouts: vec![ExportLayout::ProgramSettings],
        days: BTreeMap::new(),
        goals,
        warnings: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn num(p: &ParsedExport, date: &str, f: Field) -> Option<f64> {
        p.days
            .get(&d(date))
            .and_then(|m| m.get(&f))
            .and_then(|v| v.as_ref())
            .and_then(Value::as_f64)
    }

    const QUICK: &str = "\
Date,Expenditure,Trend Weight (kg),Weight (kg),Steps,Calories (kcal),Protein (g),Fat (g),Carbs (g)
2026-02-09,2450.7,73.46,73.04,8123,2100.9,180.26,70,210
02/10/2026,2400,73.4,,9000,1950,175,65,N/A
,,,,,,,,
2026-02-11,,,,,,,,
";

    #[test]
    fn test_detect_layouts() {
        let h = |s: &str| s.split(',').map(str::to_lowercase).collect::<Vec<_>>();
        assert_eq!(
            ExportLayout::detect(&h("Date,Expenditure,Trend Weight (kg),Weight (kg)")),
            Some(ExportLayout::QuickExport)
        );
        assert_eq!(
            ExportLayout::detect(&h("Date,Calories (kcal),Protein (g),Fat (g),Carbs (g)")),
            Some(ExportLayout::DetailedMacros)
        );
        assert_eq!(
            ExportLayout::detect(&h("Date,Weight (kg),Fat Percent")),
            Some(ExportLayout::DetailedScaleWeight)
        );
        assert_eq!(
            ExportLayout::detect(&h("Program Update Date,Program Weekday,Calories (kcal)")),
            Some(ExportLayout::ProgramSettings)
        );
        assert_eq!(ExportLayout::detect(&h("Meal,Food Name")), None);
    }

    #[test]
    fn test_quick_export() {
        let p = parse_csv(QUICK.as_bytes()).unwrap();
        assert_eq!(p.layouts, vec![ExportLayout::QuickExport]);
        assert_eq!(p.days.len(), 2);

        assert_eq!(num(&p, "2026-02-09", Field::WeightKg), Some(73.0));
        assert_eq!(num(&p, "2026-02-09", Field::TrendWeightKg), Some(73.5));
        assert_eq!(num(&p, "2026-02-09", Field::Calories), Some(2100.0));
        assert_eq!(num(&p, "2026-02-09", Field::Expenditure), Some(2450.0));
        assert_eq!(num(&p, "2026-02-09", Field::ProteinG), Some(180.3));
        assert_eq!(num(&p, "2026-02-09", Field::FatsG), Some(70.0));

        assert_eq!(num(&p, "2026-02-10", Field::WeightKg), None);
        assert_eq!(num(&p, "2026-02-10", Field::CarbsG), None);
        assert_eq!(num(&p, "2026-02-10", Field::Calories), Some(1950.0));

        for fields in p.days.values() {
            assert!(!fields.contains_key(&Field::Steps));
        }
        assert_eq!(p.nutrition_count(), 2);
        assert_eq!(p.weight_count(), 1);
    }

    #[test]
    fn test_weight_header_never_claims_trend_weight() {
        let csv = "Date,Trend Weight (kg),Weight (kg),Calories (kcal)\n2026-02-09,80.0,73.0,2000\n";
        let p = parse_csv(csv.as_bytes()).unwrap();
        assert_eq!(num(&p, "2026-02-09", Field::WeightKg), Some(73.0));
        assert_eq!(num(&p, "2026-02-09", Field::TrendWeightKg), Some(80.0));
    }

    #[test]
    fn test_detailed_sheets_merge_by_date() {
        let macros = "Date,Calories (kcal),Protein (g),Fat (g),Carbs (g)\n2026-02-09,2100,180,70,210\n";
        let scale = "Date,Weight (kg),Fat Percent\n2026-02-09,73.0,18.5\n2026-02-10,72.8,\n";
        let mut all = parse_csv(macros.as_bytes()).unwrap();
        all.merge(parse_csv(scale.as_bytes()).unwrap());

        assert_eq!(
            all.layouts,
            vec![ExportLayout::DetailedMacros, ExportLayout::DetailedScaleWeight]
        );
        assert_eq!(num(&all, "2026-02-09", Field::Calories), Some(2100.0));
        assert_eq!(num(&all, "2026-02-09", Field::WeightKg), Some(73.0));
        assert_eq!(num(&all, "2026-02-09", Field::FatPercent), Some(18.5));
        assert_eq!(num(&all, "2026-02-10", Field::WeightKg), Some(72.8));
        assert_eq!(all.weight_count(), 2);
        assert_eq!(all.nutrition_count(), 1);
    }

    #[test]
    fn test_out_of_range_values_dropped_with_warning() {
        let csv = "Date,Weight (kg),Fat Percent\n2026-02-09,250,18\n2026-02-10,30,\n";
        let p = parse_csv(csv.as_bytes()).unwrap();
        assert_eq!(p.warnings.len(), 2);
        assert_eq!(num(&p, "2026-02-09", Field::WeightKg), None);
        assert_eq!(num(&p, "2026-02-09", Field::FatPercent), Some(18.0));
        // A day left with nothing is not reported at all.
        assert!(!p.days.contains_key(&d("2026-02-10")));
    }

    #[test]
    fn test_program_settings_keeps_latest_per_weekday() {
        let csv = "\
Program Update Date,Program Weekday,Calories (kcal),Fat (g),Protein (g),Carbs (g),Expenditure,Weight (kg)
2026-01-01,Monday,2200,70,170,240,2500,74
2026-02-01,Monday,2100,65,180,220,2450,73.5
2026-02-01,1,2000.9,60,180,200,2450,73.5
2026-01-15,monday,1800,50,160,180,2300,72
,Sunday,1,1,1,1,1,1
";
        let p = parse_csv(csv.as_bytes()).unwrap();
        assert_eq!(p.layouts, vec![ExportLayout::ProgramSettings]);
        assert!(p.days.is_empty());
        assert_eq!(p.goals.len(), 2);

        let monday = &p.goals[0];
        assert_eq!(monday.day_of_week, 0);
        assert_eq!(monday.weekday, "Monday");
        assert_eq!(monday.target_calories, Some(2100));
        assert_eq!(monday.target_fats_g, Some(65));
        assert_eq!(monday.target_weight_kg, Some(73.5));
        assert_eq!(monday.last_updated, d("2026-02-01"));

        let tuesday = &p.goals[1];
        assert_eq!(tuesday.weekday, "Tuesday");
        assert_eq!(tuesday.target_calories, Some(2000));
    }

    #[test]
    fn test_unknown_layout_is_an_error() {
        let err = parse_csv("Meal,Food Name\nlunch,rice\n".as_bytes()).unwrap_err();
        assert!(err.to_string().contains("Unknown MacroFactor export"));
    }

    enum Cell<'a> {
        Text(&'a str),
        Num(f64),
        /// A number styled with the built-in date format.
        Date(f64),
    }

    /// Build a minimal `.xlsx` in memory.
    fn workbook(sheets: &[(&str, Vec<Vec<Cell>>)]) -> Vec<u8> {
        use std::io::Write;
        use zip::write::SimpleFileOptions;

        let mut strings: Vec<String> = Vec::new();
        let mut sheet_xml = Vec::new();
        for (_, rows) in sheets {
            let mut xml = String::from(
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>"#,
            );
            for (r, row) in rows.iter().enumerate() {
                xml.push_str(&format!(r#"<row r="{}">"#, r + 1));
                for (c, value) in row.iter().enumerate() {
                    let at = format!("{}{}", char::from(b'A' + c as u8), r + 1);
                    match value {
                        Cell::Text(t) => {
                            strings.push((*t).to_string());
                            xml.push_str(&format!(
                                r#"<c r="{at}" t="s"><v>{}</v></c>"#,
                                strings.len() - 1
                            ));
                        }
                        Cell::Num(n) => xml.push_str(&format!(r#"<c r="{at}"><v>{n}</v></c>"#)),
                        Cell::Date(n) => {
                            xml.push_str(&format!(r#"<c r="{at}" s="1"><v>{n}</v></c>"#));
                        }
                    }
                }
                xml.push_str("</row>");
            }
            xml.push_str("</sheetData></worksheet>");
            sheet_xml.push(xml);
        }

        fn escape(s: &str) -> String {
            s.replace('&', "&amp;")
        }

        let mut content_types = String::from(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/><Override PartName="/xl/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml"/><Override PartName="/xl/sharedStrings.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sharedStrings+xml"/>"#,
        );
        let mut book = String::from(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets>"#,
        );
        let mut rels = String::from(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
        );
        for (i, (name, _)) in sheets.iter().enumerate() {
            let n = i + 1;
            content_types.push_str(&format!(
                r#"<Override PartName="/xl/worksheets/sheet{n}.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/>"#
            ));
            book.push_str(&format!(
                r#"<sheet name="{}" sheetId="{n}" r:id="rId{n}"/>"#,
                escape(name)
            ));
            rels.push_str(&format!(
                r#"<Relationship Id="rId{n}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet{n}.xml"/>"#
            ));
        }
        let n = sheets.len();
        rels.push_str(&format!(
            r#"<Relationship Id="rId{}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/><Relationship Id="rId{}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/sharedStrings" Target="sharedStrings.xml"/></Relationships>"#,
            n + 1,
            n + 2
        ));
        content_types.push_str("</Types>");
        book.push_str("</sheets></workbook>");

        let mut shared = format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><sst xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" count="{0}" uniqueCount="{0}">"#,
            strings.len()
        );
        for s in &strings {
            shared.push_str(&format!("<si><t>{}</t></si>", escape(s)));
        }
        shared.push_str("</sst>");

        let styles = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><cellXfs count="2"><xf numFmtId="0" fontId="0" fillId="0" borderId="0" xfId="0"/><xf numFmtId="14" fontId="0" fillId="0" borderId="0" xfId="0" applyNumberFormat="1"/></cellXfs></styleSheet>"#;
        let root_rels = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/></Relationships>"#;

        let mut parts = vec![
            ("[Content_Types].xml".to_string(), content_types),
            ("_rels/.rels".to_string(), root_rels.to_string()),
            ("xl/workbook.xml".to_string(), book),
            ("xl/_rels/workbook.xml.rels".to_string(), rels),
            ("xl/styles.xml".to_string(), styles.to_string()),
            ("xl/sharedStrings.xml".to_string(), shared),
        ];
        for (i, xml) in sheet_xml.into_iter().enumerate() {
            parts.push((format!("xl/worksheets/sheet{}.xml", i + 1), xml));
        }

        let mut zip = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
        let options =
            SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
        for (name, body) in parts {
            zip.start_file(name, options).unwrap();
            zip.write_all(body.as_bytes()).unwrap();
        }
        zip.finish().unwrap().into_inner()
    }

    fn detailed_workbook() -> Vec<u8> {
        use Cell::{Date, Num, Text};
        workbook(&[
            (
                "Calories & Macros",
                vec![
                    vec![
                        Text("Date"),
                        Text("Calories (kcal)"),
                        Text("Protein (g)"),
                        Text("Fat (g)"),
                        Text("Carbs (g)"),
                    ],
                    vec![Date(46062.0), Num(2100.4), Num(180.26), Num(70.0), Num(210.0)],
                    vec![Date(46063.0), Num(1950.0), Num(175.0), Num(65.0), Text("N/A")],
                ],
            ),
            (
                "Micronutrients",
                vec![vec![Text("Date"), Text("Calories (kcal)")], vec![Date(46062.0), Num(9999.0)]],
            ),
            (
                "Scale Weight",
                vec![
                    vec![Text("Date"), Text("Weight (kg)"), Text("Fat Percent")],
                    // plain number in the date column, no date style
                    vec![Num(46062.0), Num(73.04), Num(18.5)],
                    vec![Text("2026-02-10"), Num(250.0), Text("")],
                ],
            ),
        ])
    }

    #[test]
    fn test_workbook_sheets_detected_by_name() {
        let p = parse_workbook(std::io::Cursor::new(detailed_workbook())).unwrap();
        assert_eq!(
            p.layouts,
            vec![ExportLayout::DetailedMacros, ExportLayout::DetailedScaleWeight]
        );

        assert_eq!(num(&p, "2026-02-09", Field::Calories), Some(2100.0));
        assert_eq!(num(&p, "2026-02-09", Field::ProteinG), Some(180.3));
        assert_eq!(num(&p, "2026-02-09", Field::WeightKg), Some(73.0));
        assert_eq!(num(&p, "2026-02-09", Field::FatPercent), Some(18.5));
        assert_eq!(num(&p, "2026-02-10", Field::Calories), Some(1950.0));
        assert_eq!(num(&p, "2026-02-10", Field::CarbsG), None);
        assert_eq!(num(&p, "2026-02-10", Field::WeightKg), None);
        assert_eq!(p.warnings.len(), 1);
        assert_eq!(p.nutrition_count(), 2);
        assert_eq!(p.weight_count(), 1);
    }

    #[test]
    fn test_workbook_program_settings() {
        use Cell::{Date, Num, Text};
        let bytes = workbook(&[(
            "Program Settings",
            vec![
                vec![
                    Text("Program Update Date"),
                    Text("Program Weekday"),
                    Text("Calories (kcal)"),
                    Text("Protein (g)"),
                ],
                vec![Date(46054.0), Text("Monday"), Num(2100.0), Num(180.0)],
            ],
        )]);
        let p = parse_bytes("MacroFactor.xlsx", &bytes).unwrap();
        assert_eq!(p.layouts, vec![ExportLayout::ProgramSettings]);
        assert_eq!(p.goals.len(), 1);
        assert_eq!(p.goals[0].target_calories, Some(2100));
        assert_eq!(p.goals[0].last_updated, d("2026-02-01"));
    }

    #[test]
    fn test_workbook_without_known_sheets_is_an_error() {
        use Cell::Text;
        let bytes = workbook(&[("Food Log", vec![vec![Text("Meal"), Text("Food Name")]])]);
        let err = parse_workbook(std::io::Cursor::new(bytes)).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("Unknown MacroFactor export"));
        assert!(msg.contains("Food Log"));
    }

    #[test]
    fn test_parse_bytes_picks_reader_by_name() {
        assert!(is_supported("export.XLSX"));
        assert!(is_supported("scale.csv"));
        assert!(!is_supported("notes.txt"));

        let csv = b"Date,Weight (kg),Fat Percent\n2026-02-09,73.0,18\n";
        let p = parse_bytes("scale.csv", csv).unwrap();
        assert_eq!(p.layouts, vec![ExportLayout::DetailedScaleWeight]);
        assert!(parse_bytes("scale.xlsx", csv).is_err());
    }

    #[test]
    fn test_parse_files_mixes_csv_and_workbook() {
        let dir = tempfile::tempdir().unwrap();
        let book = dir.path().join("MacroFactor.xlsx");
        let program = dir.path().join("program.csv");
        std::fs::write(&book, detailed_workbook()).unwrap();
        std::fs::write(
            &program,
            "Program Update Date,Program Weekday,Calories (kcal)\n2026-02-01,Monday,2100\n",
        )
        .unwrap();

        let p = parse_files(&[book, program]).unwrap();
        assert_eq!(p.layouts.len(), 3);
        assert_eq!(p.days.len(), 2);
        assert_eq!(p.goals.len(), 1);
    }

    #[test]
    fn test_parse_files_missing_file() {
        let err = parse_files(&["/nonexistent/x.csv"]).unwrap_err();
        assert!(err.to_string().contains("Failed to open file"));
    }
}
