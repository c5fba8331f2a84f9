use einvoice_xsd::{CaseKey, DocumentKind, DocumentProducer};
use mockall::mock;

mock! {
    pub Producer {}

    impl DocumentProducer for Producer {
        fn produce(&self, key: &CaseKey, kind: DocumentKind) -> anyhow::Result<Vec<u8>>;
    }
}

/// A producer that renders the same document for every case.
pub fn fixed_producer(document: String) -> MockProducer {
    let mut producer = MockProducer::new();
    producer
        .expect_produce()
        .returning(move |_, _| Ok(document.clone().into_bytes()));
    producer
}
