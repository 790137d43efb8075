// Property tests for the reply scanner and the pack/parse pairing.
use std::collections::BTreeMap;

use coderelay::core::matcher::ExtensionSet;
use coderelay::core::pack::{PackOptions, SourceRoot, package};
use coderelay::core::reply::parse;
use proptest::prelude::*;

/// Reply-ish text: prose, tag fragments, quotes and line breaks.
fn reply_text() -> impl Strategy<Value = String> {
    let piece = prop_oneof![
        "[a-zA-Z0-9 .,]{0,12}",
        Just("\n".to_string()),
        Just("<file path=\"a.py\">".to_string()),
        Just("<file path=\"../x\">\n".to_string()),
        Just("<file path='b/c.rs' lang=\"rs\">".to_string()),
        Just("<file>".to_string()),
        Just("<file path=>".to_string()),
        Just("</file>".to_string()),
        Just("</FILE >".to_string()),
        Just("<".to_string()),
        Just("\"".to_string()),
        Just("é".to_string()),
    ];
    prop::collection::vec(piece, 0..24).prop_map(|v| v.concat())
}

proptest! {
    #[test]
    fn every_byte_is_accounted_for(reply in reply_text()) {
        let parsed = parse(&reply);

        // Fragments and block spans tile the input in order
        let mut pieces: Vec<(usize, &str)> = parsed
            .fragments
            .iter()
            .map(|f| (f.offset, f.text.as_str()))
            .chain(parsed.files.iter().map(|f| (f.span.start, &reply[f.span.clone()])))
            .collect();
        pieces.sort_by_key(|(offset, _)| *offset);

        let mut cursor = 0;
        for (offset, text) in &pieces {
            prop_assert_eq!(*offset, cursor);
            cursor += text.len();
        }
        prop_assert_eq!(cursor, reply.len());

        let rebuilt: String = pieces.iter().map(|(_, t)| *t).collect();
        prop_assert_eq!(rebuilt, reply);
    }

    #[test]
    fn only_the_last_block_can_be_unterminated(reply in reply_text()) {
        let parsed = parse(&reply);
        if let Some((_, init)) = parsed.files.split_last() {
            prop_assert!(init.iter().all(|f| f.terminated));
        }
    }

    #[test]
    fn text_without_angle_brackets_has_no_blocks(reply in "[^<]{0,200}") {
        let parsed = parse(&reply);
        prop_assert!(parsed.files.is_empty());
        prop_assert_eq!(parsed.unattributed_text(), reply);
        prop_assert!(parsed.is_ambiguous());
    }
}

fn project() -> impl Strategy<Value = BTreeMap<String, String>> {
    let path = ("(d_[a-z]{1,4}/){0,2}", "[a-z]{1,6}").prop_map(|(dirs, name)| format!("{dirs}{name}.py"));
    let content = "[a-z0-9 =<>/\"'\n\t]{1,60}".prop_filter("no close tag", |c| {
        !c.to_ascii_lowercase().contains("</file")
    });
    prop::collection::btree_map(path, content, 1..6)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn packed_documents_parse_back_to_the_same_files(files in project()) {
        let tmp = tempfile::tempdir().unwrap();
        for (path, content) in &files {
            let abs = tmp.path().join(path);
            std::fs::create_dir_all(abs.parent().unwrap()).unwrap();
            std::fs::write(&abs, content).unwrap();
        }

        let exts = ExtensionSet::parse_list("py").unwrap();
        let packed = package(&[SourceRoot::new(tmp.path(), exts)], &PackOptions::default()).unwrap();
        let parsed = parse(packed.document.as_str());

        let got: Vec<(String, String)> = parsed
            .files
            .iter()
            .map(|f| (f.path.clone(), f.content.clone()))
            .collect();
        let want: Vec<(String, String)> = files.into_iter().collect();
        prop_assert_eq!(got, want);
        prop_assert!(parsed.files.iter().all(|f| f.terminated && f.is_valid()));
        prop_assert!(parsed.anomalies.is_empty());
    }
}

#[test]
fn test_blocks_come_back_in_reply_order() {
    let reply = "<file path=\"z.py\">\nz\n</file>\n<file path=\"a.py\">\na\n</file>\n";
    let parsed = parse(reply);
    let paths: Vec<_> = parsed.files.iter().map(|f| f.path.as_str()).collect();
    assert_eq!(paths, vec!["z.py", "a.py"]);
}

#[test]
fn test_second_open_tag_inside_block_is_content() {
    let reply = "<file path=\"a.py\">\nx = '<file path=\"b.py\">'\n</file>\n";
    let parsed = parse(reply);
    assert_eq!(parsed.files.len(), 1);
    assert_eq!(parsed.files[0].content, "x = '<file path=\"b.py\">'\n");
}
