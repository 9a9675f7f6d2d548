use anyhow::anyhow;
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use pretty_assertions::assert_eq;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use edp_invoices::config::ContractAliases;
use edp_invoices::domain::{
    MessageDetail, MessageId, MessagePage, MessagePart, MessageSummary, PartBody,
};
use edp_invoices::mail::decoders::DateZone;
use edp_invoices::mail::provider::{Mailbox, ProviderError, Result as ProviderResult};
use edp_invoices::mail::query::SearchQuery;
use edp_invoices::scan::{ScanReport, Scanner};
use edp_invoices::shutdown::ShutdownSignal;
use edp_invoices::store::{Artifact, ArtifactSink, Emitter};

const JULY_8_2024: i64 = 1_720_400_000_000;

/// In-memory mailbox; pages are addressed by token, page 0 has none.
#[derive(Default)]
struct FakeMailbox {
    pages: HashMap<Option<String>, ProviderResult<MessagePage>>,
    details: HashMap<String, MessageDetail>,
    raw: HashMap<String, String>,
    attachments: HashMap<String, String>,
}

impl FakeMailbox {
    fn page(mut self, token: Option<&str>, ids: &[&str], next: Option<&str>) -> Self {
        let page = MessagePage {
            messages: ids.iter().map(|id| MessageSummary::new(*id)).collect(),
            next_page_token: next.map(str::to_string),
        };
        self.pages.insert(token.map(str::to_string), Ok(page));
        self
    }

    fn failing_page(mut self, token: &str) -> Self {
        self.pages.insert(
            Some(token.to_string()),
            Err(ProviderError::Connection("connection reset".into())),
        );
        self
    }

    fn message(mut self, id: &str, subject: &str, parts: Vec<MessagePart>) -> Self {
        let headers = MessageDetail::collect_headers([
            ("From".to_string(), "EDP <faturaedp@edp.pt>".to_string()),
            ("Subject".to_string(), subject.to_string()),
        ]);
        self.details.insert(
            id.to_string(),
            MessageDetail {
                id: id.to_string(),
                internal_date_ms: JULY_8_2024,
                headers,
                parts,
            },
        );
        self.raw
            .insert(id.to_string(), URL_SAFE_NO_PAD.encode(raw_message(id)));
        self
    }

    fn attachment(mut self, id: &str, bytes: &[u8]) -> Self {
        self.attachments
            .insert(id.to_string(), URL_SAFE_NO_PAD.encode(bytes));
        self
    }
}

impl Mailbox for FakeMailbox {
    fn list_messages(&self, query: &str, page_token: Option<&str>) -> ProviderResult<MessagePage> {
        assert_eq!(query, "from:faturaedp@edp.pt has:attachment");
        match self.pages.get(&page_token.map(str::to_string)) {
            Some(Ok(page)) => Ok(page.clone()),
            Some(Err(e)) => Err(ProviderError::Connection(e.to_string())),
            None => Err(ProviderError::NotFound(format!("page {page_token:?}"))),
        }
    }

    fn get_message(&self, id: &str) -> ProviderResult<MessageDetail> {
        self.details
            .get(id)
            .cloned()
            .ok_or_else(|| ProviderError::NotFound(id.to_string()))
    }

    fn get_raw_message(&self, id: &str) -> ProviderResult<String> {
        self.raw
            .get(id)
            .cloned()
            .ok_or_else(|| ProviderError::NotFound(id.to_string()))
    }

    fn get_attachment(&self, _message_id: &str, attachment_id: &str) -> ProviderResult<String> {
        self.attachments
            .get(attachment_id)
            .cloned()
            .ok_or_else(|| ProviderError::NotFound(attachment_id.to_string()))
    }
}

fn raw_message(id: &str) -> Vec<u8> {
    format!("Message-ID: <{id}@edp.pt>\r\nFrom: EDP <faturaedp@edp.pt>\r\n\r\nfatura\r\n").into_bytes()
}

fn pdf(filename: &str, body: PartBody) -> MessagePart {
    MessagePart {
        mime_type: "application/pdf".into(),
        filename: filename.into(),
        body,
    }
}

fn query() -> SearchQuery {
    SearchQuery::new()
        .with("from", "faturaedp@edp.pt")
        .with("has", "attachment")
}

fn aliases() -> ContractAliases {
    [("100200300200", "mafra")].into_iter().collect()
}

fn files_in(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

fn scan(mailbox: &FakeMailbox, dir: &Path) -> anyhow::Result<ScanReport> {
    let aliases = aliases();
    let mut emitter = Emitter::new(dir)?;
    Scanner::new(mailbox, &aliases, DateZone::Utc, &mut emitter)?.run(&query())
}

#[test]
fn saves_invoices_and_raw_messages_across_pages() {
    let mailbox = FakeMailbox::default()
        .page(None, &["m1", "m2", "m5"], Some("p1"))
        .page(Some("p1"), &["m3", "m4"], None)
        .message(
            "m1",
            "A sua fatura EDP (contrato 100200300200)",
            vec![pdf("187008571923.pdf", PartBody::Attachment("a1".into()))],
        )
        // m2 has no detail: listed, then skipped; m5 after it on the same page still runs
        .message(
            "m5",
            "A sua fatura EDP (contrato 100200300200)",
            vec![pdf("187008571999.pdf", PartBody::Attachment("a5".into()))],
        )
        .message(
            "m3",
            "=?UTF-8?Q?A_sua_fatura_EDP?= (contrato 555)",
            vec![
                pdf("1.pdf", PartBody::Attachment("missing".into())),
                pdf("2.pdf", PartBody::Inline(URL_SAFE_NO_PAD.encode(b"%PDF-inline"))),
                pdf("condicoes-gerais.pdf", PartBody::Attachment("a1".into())),
            ],
        )
        .message("m4", "Aviso de pagamento", vec![])
        .attachment("a1", b"%PDF-1.7 invoice")
        .attachment("a5", b"%PDF-1.7 second invoice");

    let dir = tempfile::tempdir().unwrap();
    let report = scan(&mailbox, dir.path()).unwrap();

    assert_eq!(
        report,
        ScanReport {
            listed: 5,
            classified: 4,
            skipped: 1,
            attachments_saved: 3,
            attachments_failed: 1,
            raw_saved: 4,
            raw_failed: 0,
            cancelled: false,
        }
    );
    assert_eq!(
        files_in(dir.path()),
        vec![
            "2024-07-08-edp-100200300200-mafra-187008571923.pdf",
            "2024-07-08-edp-100200300200-mafra-187008571999.pdf",
            "2024-07-08-edp-100200300200-mafra-m5.eml",
            "2024-07-08-edp-100200300200-mafra.eml",
            "2024-07-08-edp-555-2.pdf",
            "2024-07-08-edp-555.eml",
            "2024-07-08-m4.eml",
        ]
    );
    assert_eq!(
        fs::read(dir.path().join("2024-07-08-edp-100200300200-mafra-187008571923.pdf")).unwrap(),
        b"%PDF-1.7 invoice"
    );
    assert_eq!(
        fs::read(dir.path().join("2024-07-08-edp-100200300200-mafra-187008571999.pdf")).unwrap(),
        b"%PDF-1.7 second invoice"
    );
    assert_eq!(
        fs::read(dir.path().join("2024-07-08-edp-100200300200-mafra-m5.eml")).unwrap(),
        raw_message("m5")
    );
    assert_eq!(
        fs::read(dir.path().join("2024-07-08-edp-555-2.pdf")).unwrap(),
        b"%PDF-inline"
    );
    assert_eq!(
        fs::read(dir.path().join("2024-07-08-m4.eml")).unwrap(),
        raw_message("m4")
    );
}

#[test]
fn two_messages_for_one_contract_keep_both_eml_files() {
    let mailbox = FakeMailbox::default()
        .page(None, &["m1", "m2"], None)
        .message("m1", "Fatura (contrato 9)", vec![])
        .message("m2", "Fatura (contrato 9)", vec![]);

    let dir = tempfile::tempdir().unwrap();
    let report = scan(&mailbox, dir.path()).unwrap();

    assert_eq!(report.raw_saved, 2);
    assert_eq!(
        files_in(dir.path()),
        vec!["2024-07-08-edp-9-m2.eml", "2024-07-08-edp-9.eml"]
    );
    assert_eq!(
        fs::read(dir.path().join("2024-07-08-edp-9.eml")).unwrap(),
        raw_message("m1")
    );
    assert_eq!(
        fs::read(dir.path().join("2024-07-08-edp-9-m2.eml")).unwrap(),
        raw_message("m2")
    );
}

#[test]
fn failed_search_page_aborts_after_earlier_messages_are_saved() {
    let mailbox = FakeMailbox::default()
        .page(None, &["m1"], Some("p1"))
        .failing_page("p1")
        .message("m1", "Fatura (contrato 9)", vec![]);

    let dir = tempfile::tempdir().unwrap();
    let err = scan(&mailbox, dir.path()).unwrap_err();

    assert!(
        format!("{err:#}").contains("Unable to retrieve messages"),
        "{err:#}"
    );
    assert_eq!(files_in(dir.path()), vec!["2024-07-08-edp-9.eml"]);
}

#[test]
fn empty_mailbox_is_a_clean_run() {
    let mailbox = FakeMailbox::default().page(None, &[], None);
    let dir = tempfile::tempdir().unwrap();
    assert_eq!(scan(&mailbox, dir.path()).unwrap(), ScanReport::default());
    assert!(files_in(dir.path()).is_empty());
}

#[test]
fn shutdown_stops_before_the_next_message() {
    let mailbox = FakeMailbox::default()
        .page(None, &["m1"], None)
        .message("m1", "Fatura (contrato 9)", vec![]);
    let shutdown = ShutdownSignal::new();
    shutdown.trigger();

    let dir = tempfile::tempdir().unwrap();
    let aliases = aliases();
    let mut emitter = Emitter::new(dir.path()).unwrap();
    let report = Scanner::new(&mailbox, &aliases, DateZone::Utc, &mut emitter)
        .unwrap()
        .with_shutdown(shutdown)
        .run(&query())
        .unwrap();

    assert!(report.cancelled);
    assert_eq!(report.listed, 0);
    assert!(files_in(dir.path()).is_empty());
}

/// Sink that refuses every write.
struct ReadOnlyDisk {
    attempts: Vec<String>,
}

impl ArtifactSink for ReadOnlyDisk {
    fn emit(&mut self, _message_id: &MessageId, artifact: &Artifact) -> anyhow::Result<PathBuf> {
        self.attempts.push(artifact.file_name.clone());
        Err(anyhow!("read-only file system"))
    }
}

#[test]
fn write_failures_are_counted_and_do_not_stop_the_scan() {
    let mailbox = FakeMailbox::default()
        .page(None, &["m1", "m2"], None)
        .message(
            "m1",
            "Fatura (contrato 9)",
            vec![pdf("1.pdf", PartBody::Attachment("a1".into()))],
        )
        .message("m2", "Fatura (contrato 10)", vec![])
        .attachment("a1", b"%PDF");

    let aliases = ContractAliases::default();
    let mut sink = ReadOnlyDisk { attempts: Vec::new() };
    let report = Scanner::new(&mailbox, &aliases, DateZone::Utc, &mut sink)
        .unwrap()
        .run(&query())
        .unwrap();

    assert_eq!(report.classified, 2);
    assert_eq!(report.attachments_failed, 1);
    assert_eq!(report.raw_failed, 2);
    assert_eq!(report.attachments_saved + report.raw_saved, 0);
    assert_eq!(
        sink.attempts,
        vec![
            "2024-07-08-edp-9-1.pdf",
            "2024-07-08-edp-9.eml",
            "2024-07-08-edp-10.eml",
        ]
    );
}
