mod common;

use common::fixtures::{DocumentationTree, LEGACY_NOT_A_SCHEMA, LEGACY_XMLDSIG, ubl_document};
use common::mocks::fixed_producer;
use einvoice_xsd::schema_loader::LEGACY_XMLDSIG_SCHEMA;
use einvoice_xsd::{
    CaseEntry, CaseKey, CaseTable, Config, ConformanceEngine, Dialect, DocumentKind, Profile,
    StandardVersion,
};

const XMLDSIG_NS: &str = "http://www.w3.org/2000/09/xmldsig#";

fn engine_with(config: &Config) -> ConformanceEngine {
    common::init_tracing();
    ConformanceEngine::new(config).unwrap()
}

#[test]
fn test_legacy_xmldsig_schema_compiles_under_tolerant_policy() {
    let tree = DocumentationTree::new().with_ubl(LEGACY_XMLDSIG);
    let engine = engine_with(&Config::default());

    let bundle = engine.bundle(&tree.ubl_dir()).unwrap();

    assert!(bundle.skipped().is_empty());
    assert!(bundle.declares(Some(XMLDSIG_NS), "DigestValue"));
    let legacy = bundle
        .members()
        .iter()
        .find(|m| m.path.ends_with(format!("common/{}", LEGACY_XMLDSIG_SCHEMA)))
        .expect("legacy member");
    assert_eq!(legacy.target_namespace(), Some(XMLDSIG_NS));
}

#[test]
fn test_unreadable_legacy_file_is_skipped_and_bundle_still_validates() {
    let tree = DocumentationTree::new().with_ubl(LEGACY_NOT_A_SCHEMA);
    let engine = engine_with(&Config::default());

    let bundle = engine.bundle(&tree.ubl_dir()).unwrap();
    assert_eq!(bundle.skipped().len(), 1);
    assert!(bundle.skipped()[0].path.ends_with(LEGACY_XMLDSIG_SCHEMA));
    assert!(!bundle.skipped()[0].reason.is_empty());

    let report = engine
        .validate_document(
            &tree.ubl_dir(),
            &mut std::io::Cursor::new(ubl_document("Invoice", "42.00")),
        )
        .unwrap();
    assert!(report.is_conformant(), "{}", report);
}

#[test]
fn test_without_tolerant_rule_the_bad_file_is_a_compile_issue() {
    let tree = DocumentationTree::new().with_ubl(LEGACY_NOT_A_SCHEMA);
    let mut config = Config::default();
    config.schemas.policy_rules.clear();
    let engine = engine_with(&config);

    let bundle = engine.bundle(&tree.ubl_dir()).unwrap();

    assert!(bundle.skipped().is_empty());
    assert!(bundle
        .issues()
        .iter()
        .any(|i| i.path.ends_with(LEGACY_XMLDSIG_SCHEMA)));
    assert!(bundle.declares(
        Some("urn:oasis:names:specification:ubl:schema:xsd:Invoice-2"),
        "Invoice"
    ));
}

#[test]
fn test_custom_case_entry_over_legacy_directory() {
    let tree = DocumentationTree::new().with_ubl(LEGACY_NOT_A_SCHEMA);
    let key = CaseKey::new(StandardVersion::Version23, Profile::XRechnung, Dialect::Ubl);
    let table = CaseTable::new(
        tree.root(),
        vec![CaseEntry {
            key,
            schema_dir: tree.ubl_dir().to_string_lossy().replace('/', "\\"),
            kinds: vec![DocumentKind::CreditNote],
        }],
    );
    let engine = engine_with(&Config::default()).with_cases(table);
    let producer = fixed_producer(ubl_document("CreditNote", "7.5"));

    let outcomes = engine.check_cases(&producer);

    assert_eq!(outcomes.len(), 1);
    assert!(outcomes[0].passed(), "{:?}", outcomes[0].failure_message());
}
