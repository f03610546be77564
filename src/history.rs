// src/history.rs

//! Fetching, caching and parsing of the transaction history.
//!
//! Each depot/stream pair has one cache file holding the XML history fetched
//! so far. Raw fetch results are written to the cache before they are parsed
//! so a crash never forces the server to be queried again for the same
//! history. Deleting the file forces a full re-fetch.

use crate::error::{Error, Result};
use crate::model::{StreamRef, Transaction, TransactionId};
use crate::source::SourceControl;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// All known transactions of a stream, ordered by id
#[derive(Debug, Default, Clone)]
pub struct HistoryDocument {
    transactions: BTreeMap<TransactionId, Transaction>,
}

impl HistoryDocument {
    pub fn parse(xml: &str) -> Result<Self> {
        let mut reader = Reader::from_str(xml);
        reader.trim_text(true);

        let mut transactions = BTreeMap::new();
        let mut current: Option<Transaction> = None;
        let mut stack: Vec<Vec<u8>> = Vec::new();
        let mut comment_seen = false;

        loop {
            match reader.read_event()? {
                Event::Start(e) => {
                    if e.name().as_ref() == b"transaction" {
                        current = transaction_from(&e)?;
                        comment_seen = false;
                    }
                    stack.push(e.name().as_ref().to_vec());
                }
                Event::Empty(e) => {
                    if e.name().as_ref() == b"transaction" {
                        if let Some(tx) = transaction_from(&e)? {
                            transactions.insert(tx.id, tx);
                        }
                    }
                }
                Event::Text(t) => {
                    let text = t.unescape()?;
                    append_text(&mut current, &stack, &mut comment_seen, &text);
                }
                Event::CData(c) => {
                    let raw = c.into_inner();
                    let text = String::from_utf8_lossy(&raw);
                    append_text(&mut current, &stack, &mut comment_seen, &text);
                }
                Event::End(e) => {
                    stack.pop();
                    match e.name().as_ref() {
                        b"transaction" => {
                            if let Some(tx) = current.take() {
                                transactions.insert(tx.id, tx);
                            }
                        }
                        b"comment" if current.is_some() => comment_seen = true,
                        _ => {}
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if current.is_some() {
            return Err(Error::History("unterminated <transaction> element".to_string()));
        }
        Ok(Self { transactions })
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    pub fn first(&self) -> Option<&Transaction> {
        self.transactions.values().next()
    }

    /// Transactions with id `>= start`, ascending
    pub fn from_id(&self, start: TransactionId) -> impl Iterator<Item = &Transaction> {
        self.transactions.range(start..).map(|(_, tx)| tx)
    }

    /// Keeps everything up to and including `cursor` and replaces the rest
    /// with `tail`.
    pub fn merge_tail(mut self, cursor: TransactionId, tail: HistoryDocument) -> Self {
        self.transactions.retain(|id, _| *id <= cursor);
        self.transactions
            .extend(tail.transactions.into_iter().filter(|(id, _)| *id > cursor));
        self
    }

    pub fn to_xml(&self) -> Result<String> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        writer.write_event(Event::Start(BytesStart::new("AcResponse")))?;
        for tx in self.transactions.values() {
            let id = tx.id.to_string();
            let time = tx.timestamp.to_string();
            let mut start = BytesStart::new("transaction");
            start.push_attribute(("id", id.as_str()));
            start.push_attribute(("type", "promote"));
            start.push_attribute(("time", time.as_str()));
            start.push_attribute(("user", tx.user.as_str()));
            writer.write_event(Event::Start(start))?;

            if !tx.comment.is_empty() {
                writer.write_event(Event::Start(BytesStart::new("comment")))?;
                writer.write_event(Event::Text(BytesText::new(&tx.comment)))?;
                writer.write_event(Event::End(BytesEnd::new("comment")))?;
            }
            if !tx.issue_refs.is_empty() {
                writer.write_event(Event::Start(BytesStart::new("version")))?;
                for issue in &tx.issue_refs {
                    writer.write_event(Event::Start(BytesStart::new("issueNum")))?;
                    writer.write_event(Event::Text(BytesText::new(issue)))?;
                    writer.write_event(Event::End(BytesEnd::new("issueNum")))?;
                }
                writer.write_event(Event::End(BytesEnd::new("version")))?;
            }
            writer.write_event(Event::End(BytesEnd::new("transaction")))?;
        }
        writer.write_event(Event::End(BytesEnd::new("AcResponse")))?;
        String::from_utf8(writer.into_inner())
            .map_err(|e| Error::History(format!("serialized history is not UTF-8: {}", e)))
    }
}

/// Builds a transaction from its start tag. Non-promote transactions yield `None`.
fn transaction_from(e: &BytesStart<'_>) -> Result<Option<Transaction>> {
    let mut id = None;
    let mut time = None;
    let mut user = String::new();
    let mut kind = None;

    for attr in e.attributes() {
        let attr = attr.map_err(quick_xml::Error::from)?;
        let value = attr.unescape_value()?;
        match attr.key.as_ref() {
            b"id" => id = Some(value.into_owned()),
            b"time" => time = Some(value.into_owned()),
            b"user" => user = value.into_owned(),
            b"type" => kind = Some(value.into_owned()),
            _ => {}
        }
    }

    let id = id.ok_or_else(|| Error::History("transaction without an id".to_string()))?;
    let id: TransactionId = id
        .trim()
        .parse()
        .map_err(|_| Error::History(format!("invalid transaction id {:?}", id)))?;
    let time = time.ok_or_else(|| Error::History(format!("transaction {} has no time", id)))?;
    let timestamp: i64 = time
        .trim()
        .parse()
        .map_err(|_| Error::History(format!("transaction {} has invalid time {:?}", id, time)))?;

    if kind.as_deref().is_some_and(|k| k != "promote") {
        debug!("Skipping non-promote transaction {}", id);
        return Ok(None);
    }

    Ok(Some(Transaction { id, user, timestamp, comment: String::new(), issue_refs: Vec::new() }))
}

fn append_text(current: &mut Option<Transaction>, stack: &[Vec<u8>], comment_seen: &mut bool, text: &str) {
    let Some(tx) = current.as_mut() else { return };
    match stack.last().map(Vec::as_slice) {
        Some(b"comment") if !*comment_seen => tx.comment.push_str(text),
        Some(b"issueNum") if stack.iter().any(|n| n == b"version") => tx.add_issue_ref(text.trim()),
        _ => {}
    }
}

/// The on-disk history cache for one depot/stream pair
#[derive(Debug, Clone)]
pub struct HistoryCache {
    path: PathBuf,
}

impl HistoryCache {
    pub fn for_stream(dir: &Path, stream: &StreamRef) -> Self {
        let file = format!("_{}_{}_.depot.hist.xml", stream.depot, stream.stream);
        Self { path: dir.join(file) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Loads the complete history, from the cache file when `reuse` is set
    /// and the file holds at least one transaction, otherwise from the source.
    pub fn load_full(
        &self,
        source: &dyn SourceControl,
        stream: &StreamRef,
        reuse: bool,
    ) -> Result<HistoryDocument> {
        if reuse && self.exists() {
            let doc = self.read()?;
            if !doc.is_empty() {
                info!("Reusing {} cached transactions from {}", doc.len(), self.path.display());
                return Ok(doc);
            }
            debug!("Cache file {} holds no transactions", self.path.display());
        }

        info!(
            "Retrieving complete history of {} depot, {} stream",
            stream.depot, stream.stream
        );
        self.fetch(source, stream, None)
    }

    /// Loads the history with everything after `cursor` fetched fresh from the source.
    pub fn load_since(
        &self,
        source: &dyn SourceControl,
        stream: &StreamRef,
        cursor: TransactionId,
    ) -> Result<HistoryDocument> {
        let prior = if self.exists() { self.read()? } else { HistoryDocument::default() };
        info!("Retrieving history of {} after transaction {}", stream.qualified(), cursor);
        let tail = self.fetch(source, stream, Some(cursor + 1))?;
        let merged = prior.merge_tail(cursor, tail);
        fs::write(&self.path, merged.to_xml()?)?;
        Ok(merged)
    }

    fn read(&self) -> Result<HistoryDocument> {
        let xml = fs::read_to_string(&self.path)?;
        HistoryDocument::parse(&xml)
    }

    fn fetch(
        &self,
        source: &dyn SourceControl,
        stream: &StreamRef,
        since: Option<TransactionId>,
    ) -> Result<HistoryDocument> {
        let raw = source.history(stream, since)?;
        fs::write(&self.path, &raw)?;
        let doc = HistoryDocument::parse(&raw)?;
        debug!("Fetched {} transactions into {}", doc.len(), self.path.display());
        Ok(doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use tempfile::TempDir;

    const HISTORY: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<AcResponse Command="hist" TaskId="1">
  <transaction id="12" type="promote" time="1300000100" user="asmith">
    <comment>Second &amp; last</comment>
    <version path="/./b.txt" eid="2" virtual="1/2" real="3/2">
      <issueNum>JIRA-2</issueNum>
    </version>
  </transaction>
  <transaction id="10" type="promote" time="1300000000" user="jdoe">
    <comment>First line
second line</comment>
    <version path="/./a.txt" eid="1" virtual="1/1" real="3/1">
      <issueNum>JIRA-1</issueNum>
    </version>
    <version path="/./c.txt" eid="3" virtual="1/1" real="3/1">
      <issueNum>JIRA-1</issueNum>
      <issueNum>JIRA-3</issueNum>
    </version>
  </transaction>
  <transaction id="11" type="keep" time="1300000050" user="jdoe"/>
</AcResponse>"#;

    struct FakeSource {
        responses: RefCell<Vec<String>>,
        calls: RefCell<Vec<Option<TransactionId>>>,
    }

    impl FakeSource {
        fn new(responses: &[&str]) -> Self {
            Self {
                responses: RefCell::new(responses.iter().rev().map(|s| s.to_string()).collect()),
                calls: RefCell::new(Vec::new()),
            }
        }
    }

    impl SourceControl for FakeSource {
        fn history(&self, _stream: &StreamRef, since: Option<TransactionId>) -> Result<String> {
            self.calls.borrow_mut().push(since);
            Ok(self.responses.borrow_mut().pop().expect("unexpected history call"))
        }

        fn populate(&self, _: &StreamRef, _: TransactionId, _: &Path) -> Result<()> {
            unreachable!()
        }
    }

    fn stream() -> StreamRef {
        StreamRef::new("Proj", "Main")
    }

    #[test]
    fn test_parse_orders_and_collects_fields() {
        let doc = HistoryDocument::parse(HISTORY).unwrap();
        let txs: Vec<_> = doc.from_id(0).collect();
        assert_eq!(txs.iter().map(|t| t.id).collect::<Vec<_>>(), vec![10, 12]);
        assert_eq!(txs[0].user, "jdoe");
        assert_eq!(txs[0].timestamp, 1_300_000_000);
        assert_eq!(txs[0].comment, "First line\nsecond line");
        assert_eq!(txs[0].issue_refs, vec!["JIRA-1", "JIRA-3"]);
        assert_eq!(txs[1].comment, "Second & last");
    }

    #[test]
    fn test_from_id_skips_earlier() {
        let doc = HistoryDocument::parse(HISTORY).unwrap();
        let ids: Vec<_> = doc.from_id(11).map(|t| t.id).collect();
        assert_eq!(ids, vec![12]);
    }

    #[test]
    fn test_missing_time_is_fatal() {
        let err = HistoryDocument::parse(r#"<AcResponse><transaction id="1" user="x"/></AcResponse>"#)
            .unwrap_err();
        assert!(matches!(err, Error::History(_)));
    }

    #[test]
    fn test_malformed_document_is_fatal() {
        assert!(HistoryDocument::parse("<AcResponse><transaction id=\"1\" time=\"5\">").is_err());
    }

    #[test]
    fn test_xml_survives_rewrite() {
        let doc = HistoryDocument::parse(HISTORY).unwrap();
        let again = HistoryDocument::parse(&doc.to_xml().unwrap()).unwrap();
        let a: Vec<_> = doc.from_id(0).cloned().collect();
        let b: Vec<_> = again.from_id(0).cloned().collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_full_fetch_persists_cache() {
        let dir = TempDir::new().unwrap();
        let cache = HistoryCache::for_stream(dir.path(), &stream());
        assert!(cache.path().ends_with("_Proj_Main_.depot.hist.xml"));

        let source = FakeSource::new(&[HISTORY]);
        let doc = cache.load_full(&source, &stream(), true).unwrap();
        assert_eq!(doc.len(), 2);
        assert_eq!(fs::read_to_string(cache.path()).unwrap(), HISTORY);
        assert_eq!(*source.calls.borrow(), vec![None]);
    }

    #[test]
    fn test_malformed_fetch_is_kept_on_disk() {
        let dir = TempDir::new().unwrap();
        let cache = HistoryCache::for_stream(dir.path(), &stream());
        let broken = "<AcResponse><transaction id=\"7\" type=\"promote\" user=\"jdoe\"/></AcResponse>";

        let source = FakeSource::new(&[broken]);
        let err = cache.load_full(&source, &stream(), false).unwrap_err();
        assert!(matches!(err, Error::History(_)));
        assert_eq!(fs::read_to_string(cache.path()).unwrap(), broken);
    }

    #[test]
    fn test_reuse_skips_source() {
        let dir = TempDir::new().unwrap();
        let cache = HistoryCache::for_stream(dir.path(), &stream());
        fs::write(cache.path(), HISTORY).unwrap();

        let source = FakeSource::new(&[]);
        let doc = cache.load_full(&source, &stream(), true).unwrap();
        assert_eq!(doc.len(), 2);
        assert!(source.calls.borrow().is_empty());
    }

    #[test]
    fn test_declined_reuse_refetches() {
        let dir = TempDir::new().unwrap();
        let cache = HistoryCache::for_stream(dir.path(), &stream());
        fs::write(cache.path(), "<AcResponse/>").unwrap();

        let source = FakeSource::new(&[HISTORY]);
        cache.load_full(&source, &stream(), false).unwrap();
        assert_eq!(source.calls.borrow().len(), 1);
    }

    #[test]
    fn test_empty_cache_is_refetched() {
        let dir = TempDir::new().unwrap();
        let cache = HistoryCache::for_stream(dir.path(), &stream());
        fs::write(cache.path(), "<AcResponse/>").unwrap();

        let source = FakeSource::new(&[HISTORY]);
        let doc = cache.load_full(&source, &stream(), true).unwrap();
        assert_eq!(doc.len(), 2);
    }

    #[test]
    fn test_incremental_fetch_merges_tail() {
        let dir = TempDir::new().unwrap();
        let cache = HistoryCache::for_stream(dir.path(), &stream());
        fs::write(cache.path(), HISTORY).unwrap();

        let tail = r#"<AcResponse>
  <transaction id="12" type="promote" time="1300000100" user="asmith"><comment>Rewritten</comment></transaction>
  <transaction id="13" type="promote" time="1300000200" user="jdoe"><comment>New</comment></transaction>
</AcResponse>"#;
        let source = FakeSource::new(&[tail]);
        let doc = cache.load_since(&source, &stream(), 10).unwrap();

        assert_eq!(*source.calls.borrow(), vec![Some(11)]);
        let txs: Vec<_> = doc.from_id(0).collect();
        assert_eq!(txs.iter().map(|t| t.id).collect::<Vec<_>>(), vec![10, 12, 13]);
        assert_eq!(txs[1].comment, "Rewritten");

        let on_disk = HistoryDocument::parse(&fs::read_to_string(cache.path()).unwrap()).unwrap();
        assert_eq!(on_disk.len(), 3);
    }
}
