use std::path::PathBuf;

use jobseed_adapters::{extract_all, load_input, MalformedRow};
use jobseed_core::RowLayout;

fn fixture() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../fixtures/jobs_sample.csv")
}

#[test]
fn sample_sheet_extracts_every_layout() {
    let table = load_input(fixture()).expect("load fixture");
    assert!(table.header.is_some());
    assert_eq!(table.records.len(), 7);

    let extraction = extract_all(&table.records);
    assert_eq!(extraction.fields.len(), 6);
    assert_eq!(extraction.skipped, vec![MalformedRow { position: 4, width: 2 }]);

    let layouts: Vec<_> = extraction.fields.iter().map(|f| f.layout).collect();
    assert_eq!(
        layouts,
        vec![
            RowLayout::Full,
            RowLayout::Full,
            RowLayout::Full,
            RowLayout::WithoutRole,
            RowLayout::Legacy,
            RowLayout::Full,
        ]
    );

    let codes: Vec<_> = extraction.fields.iter().map(|f| f.job_code.as_str()).collect();
    assert_eq!(codes, vec!["J-1", "J-2", "J-1", "J-3", "JOB-00006", "J-1"]);
}

#[test]
fn quoted_cells_keep_embedded_newlines_and_quotes() {
    let table = load_input(fixture()).expect("load fixture");
    let extraction = extract_all(&table.records);

    let first = &extraction.fields[0];
    assert_eq!(first.summary, "決済APIの新規開発\nチーム5名");
    assert_eq!(first.skills_text, "Python, AWS");

    let director = &extraction.fields[3];
    assert_eq!(director.title, "Webディレクター募集 O'Reilly");
    assert_eq!(director.requirements, "'週5日'常駐");
}
