//! Parsing of ClinVar E-utilities XML responses.
//!
//! esearch (phase 1):
//! ```xml
//! <eSearchResult><Count>2</Count><IdList><Id>111</Id><Id>222</Id></IdList></eSearchResult>
//! ```
//! esummary (phase 2):
//! ```xml
//! <eSummaryResult><DocumentSummarySet status="OK">
//!   <DocumentSummary uid="111">
//!     <clinical_significance><description>Pathogenic</description></clinical_significance>
//!     <trait_set><trait><trait_name>Breast-ovarian cancer, familial 1</trait_name></trait></trait_set>
//!   </DocumentSummary>
//! </DocumentSummarySet></eSummaryResult>
//! ```
//!
//! A missing significance or trait set is normal for ClinVar and is stored as
//! `None`. Anything else that breaks the expected shape of an esummary
//! response is fatal for the whole run.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use thiserror::Error;
use tracing::{debug, warn};

use crate::models::{RecordSummary, SummaryMap};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AggregateError {
    /// Phase-1 response without an identifier list. The record degrades to
    /// "no identifiers".
    #[error("malformed esearch response: {0}")]
    MalformedResponse(String),

    /// Phase-2 structural anomaly. Aborts the run.
    #[error("fatal esummary response: {0}")]
    Fatal(String),
}

/// Elements whose `description` child carries the clinical significance.
/// `germline_classification` replaced `clinical_significance` in newer
/// ClinVar esummary output.
const SIGNIFICANCE_CONTAINERS: [&[u8]; 2] = [b"clinical_significance", b"germline_classification"];

fn is_significance_container(name: &[u8]) -> bool {
    SIGNIFICANCE_CONTAINERS.contains(&name)
}

/// Extract every `Id` under the first `IdList` of an esearch response.
pub fn parse_identifiers(xml: &str) -> Result<Vec<String>, AggregateError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut ids = Vec::new();
    let mut in_list = false;
    let mut in_id = false;
    let mut current = String::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => match e.name().as_ref() {
                b"IdList" => in_list = true,
                b"Id" if in_list => {
                    in_id = true;
                    current.clear();
                }
                _ => {}
            },
            Ok(Event::Empty(ref e)) => {
                if e.name().as_ref() == b"IdList" && !in_list {
                    return Ok(ids);
                }
            }
            Ok(Event::Text(ref e)) if in_id => {
                let text = e
                    .unescape()
                    .map_err(|err| AggregateError::MalformedResponse(err.to_string()))?;
                current.push_str(&text);
            }
            Ok(Event::End(ref e)) => match e.name().as_ref() {
                b"Id" if in_id => {
                    in_id = false;
                    let id = current.trim();
                    if !id.is_empty() {
                        ids.push(id.to_string());
                    }
                }
                b"IdList" if in_list => {
                    debug!(n = ids.len(), "esearch returned identifiers");
                    return Ok(ids);
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(AggregateError::MalformedResponse(e.to_string())),
            _ => {}
        }
        buf.clear();
    }

    if in_list {
        Err(AggregateError::MalformedResponse("IdList truncated".to_string()))
    } else {
        Err(AggregateError::MalformedResponse("no IdList element".to_string()))
    }
}

/// Parse an esummary response into per-identifier summaries.
pub fn parse_summaries(xml: &str) -> Result<SummaryMap, AggregateError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut parser = SummaryParser::default();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => parser.open(e)?,
            Ok(Event::Empty(ref e)) => {
                parser.open(e)?;
                parser.close()?;
            }
            Ok(Event::End(_)) => parser.close()?,
            Ok(Event::Text(ref e)) => {
                if parser.capturing() {
                    let text = e.unescape().map_err(|err| AggregateError::Fatal(err.to_string()))?;
                    parser.text.push_str(&text);
                }
            }
            Ok(Event::CData(ref e)) => {
                if parser.capturing() {
                    parser.text.push_str(&String::from_utf8_lossy(e));
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(AggregateError::Fatal(e.to_string())),
            _ => {}
        }
        buf.clear();
    }

    parser.finish()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Capture {
    Significance,
    TraitName,
    ServiceError,
}

/// Summary under construction.
#[derive(Debug)]
struct DocumentState {
    uid: String,
    /// Stack depth of the `DocumentSummary` element itself.
    depth: usize,
    significance: Option<String>,
    significance_taken: bool,
    /// `None` until a trait set is seen; each trait's name is `None` until found.
    traits: Option<Vec<Option<String>>>,
    trait_set_depth: Option<usize>,
}

impl DocumentState {
    fn finish(self) -> (String, RecordSummary) {
        if self.significance.is_none() {
            warn!(uid = %self.uid, "No clinical significance in summary; stored as None");
        }
        let conditions = match self.traits {
            Some(traits) => traits.into_iter().collect::<Option<Vec<String>>>(),
            None => None,
        };
        if conditions.is_none() {
            debug!(uid = %self.uid, "No trait set in summary; conditions stored as None");
        }
        (
            self.uid,
            RecordSummary { clinical_significance: self.significance, conditions },
        )
    }
}

#[derive(Debug, Default)]
struct SummaryParser {
    stack: Vec<Vec<u8>>,
    doc: Option<DocumentState>,
    capture: Option<(Capture, usize)>,
    text: String,
    saw_summary_set: bool,
    summaries: SummaryMap,
}

impl SummaryParser {
    fn capturing(&self) -> bool {
        self.capture.is_some()
    }

    fn start_capture(&mut self, kind: Capture, depth: usize) {
        self.capture = Some((kind, depth));
        self.text.clear();
    }

    fn open(&mut self, e: &BytesStart) -> Result<(), AggregateError> {
        self.stack.push(e.name().as_ref().to_vec());
        let depth = self.stack.len();

        match e.name().as_ref() {
            b"DocumentSummarySet" => {
                self.saw_summary_set = true;
                return Ok(());
            }
            b"DocumentSummary" => {
                if self.doc.is_some() {
                    return Err(AggregateError::Fatal("nested DocumentSummary".to_string()));
                }
                let uid = e
                    .try_get_attribute("uid")
                    .map_err(|err| AggregateError::Fatal(err.to_string()))?
                    .ok_or_else(|| AggregateError::Fatal("DocumentSummary without uid".to_string()))?
                    .unescape_value()
                    .map_err(|err| AggregateError::Fatal(err.to_string()))?
                    .into_owned();
                self.doc = Some(DocumentState {
                    uid,
                    depth,
                    significance: None,
                    significance_taken: false,
                    traits: None,
                    trait_set_depth: None,
                });
                return Ok(());
            }
            b"ERROR" if self.doc.is_none() => {
                self.start_capture(Capture::ServiceError, depth);
                return Ok(());
            }
            _ => {}
        }

        let Some(doc) = self.doc.as_mut() else {
            return Ok(());
        };
        let rel = &self.stack[doc.depth..];
        let mut capture = None;

        match rel {
            [container, leaf]
                if is_significance_container(container)
                    && leaf.as_slice() == b"description"
                    && !doc.significance_taken =>
            {
                capture = Some(Capture::Significance);
            }
            [leaf] if leaf.as_slice() == b"trait_set" && doc.traits.is_none() => {
                doc.traits = Some(Vec::new());
                doc.trait_set_depth = Some(depth);
            }
            [container, leaf]
                if is_significance_container(container)
                    && leaf.as_slice() == b"trait_set"
                    && doc.traits.is_none() =>
            {
                doc.traits = Some(Vec::new());
                doc.trait_set_depth = Some(depth);
            }
            _ => {
                if let (Some(ts_depth), Some(traits)) = (doc.trait_set_depth, doc.traits.as_mut()) {
                    let leaf = rel.last().map(|n| n.as_slice()).unwrap_or_default();
                    if depth == ts_depth + 1 && leaf == b"trait" {
                        traits.push(None);
                    } else if depth == ts_depth + 2
                        && leaf == b"trait_name"
                        && matches!(traits.last(), Some(None))
                    {
                        capture = Some(Capture::TraitName);
                    }
                }
            }
        }

        if let Some(kind) = capture {
            self.start_capture(kind, depth);
        }
        Ok(())
    }

    fn close(&mut self) -> Result<(), AggregateError> {
        let depth = self.stack.len();

        if let Some((kind, capture_depth)) = self.capture {
            if capture_depth == depth {
                self.capture = None;
                let value = Some(self.text.trim().to_string()).filter(|t| !t.is_empty());
                match kind {
                    Capture::ServiceError => {
                        return Err(AggregateError::Fatal(format!(
                            "E-utilities error: {}",
                            value.unwrap_or_default()
                        )));
                    }
                    Capture::Significance => {
                        if let Some(doc) = self.doc.as_mut() {
                            doc.significance = value;
                            doc.significance_taken = true;
                        }
                    }
                    Capture::TraitName => {
                        if let Some(slot) = self
                            .doc
                            .as_mut()
                            .and_then(|d| d.traits.as_mut())
                            .and_then(|t| t.last_mut())
                        {
                            *slot = value;
                        }
                    }
                }
            }
        }

        if let Some(doc) = self.doc.as_mut() {
            if doc.trait_set_depth == Some(depth) {
                doc.trait_set_depth = None;
            }
            if doc.depth == depth {
                if let Some(doc) = self.doc.take() {
                    let (uid, summary) = doc.finish();
                    self.summaries.insert(uid, summary);
                }
            }
        }

        self.stack.pop();
        Ok(())
    }

    fn finish(self) -> Result<SummaryMap, AggregateError> {
        if !self.stack.is_empty() {
            return Err(AggregateError::Fatal("response truncated".to_string()));
        }
        if !self.saw_summary_set {
            return Err(AggregateError::Fatal("no DocumentSummarySet element".to_string()));
        }
        debug!(n = self.summaries.len(), "esummary returned summaries");
        Ok(self.summaries)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_identifiers() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8" ?>
<!DOCTYPE eSearchResult PUBLIC "-//NLM//DTD esearch 20060628//EN" "https://eutils.ncbi.nlm.nih.gov/eutils/dtd/20060628/esearch.dtd">
<eSearchResult>
  <Count>2</Count><RetMax>2</RetMax><RetStart>0</RetStart>
  <IdList>
    <Id>111</Id>
    <Id>222</Id>
  </IdList>
  <TranslationSet/>
</eSearchResult>"#;
        assert_eq!(parse_identifiers(xml).unwrap(), vec!["111", "222"]);
    }

    #[test]
    fn test_parse_identifiers_empty_list() {
        let xml = "<eSearchResult><Count>0</Count><IdList></IdList></eSearchResult>";
        assert_eq!(parse_identifiers(xml).unwrap(), Vec::<String>::new());

        let xml = "<eSearchResult><Count>0</Count><IdList/></eSearchResult>";
        assert_eq!(parse_identifiers(xml).unwrap(), Vec::<String>::new());
    }

    #[test]
    fn test_parse_identifiers_only_first_list() {
        let xml = "<r><IdList><Id>1</Id></IdList><IdList><Id>2</Id></IdList></r>";
        assert_eq!(parse_identifiers(xml).unwrap(), vec!["1"]);
    }

    #[test]
    fn test_parse_identifiers_missing_list_is_malformed() {
        let xml = "<eSearchResult><ERROR>Invalid db name</ERROR></eSearchResult>";
        assert!(matches!(
            parse_identifiers(xml),
            Err(AggregateError::MalformedResponse(_))
        ));
        assert!(matches!(
            parse_identifiers("<html><body>502</body></html>"),
            Err(AggregateError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_parse_identifiers_bad_xml_is_malformed() {
        assert!(matches!(
            parse_identifiers("<eSearchResult><IdList><Id>1</Id></Oops></eSearchResult>"),
            Err(AggregateError::MalformedResponse(_))
        ));
    }

    fn summary_xml(body: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8" ?>
<eSummaryResult><DocumentSummarySet status="OK"><DbBuild>Build</DbBuild>{body}</DocumentSummarySet></eSummaryResult>"#
        )
    }

    #[test]
    fn test_parse_summaries_full_record() {
        let xml = summary_xml(
            r#"<DocumentSummary uid="111">
                 <obj_type>single nucleotide variant</obj_type>
                 <clinical_significance>
                   <description>Pathogenic, risk factor</description>
                   <last_evaluated>2016/06/14 00:00</last_evaluated>
                 </clinical_significance>
                 <trait_set>
                   <trait><trait_xrefs><trait_xref><db_source>MedGen</db_source></trait_xref></trait_xrefs>
                     <trait_name>Breast-ovarian cancer, familial 1</trait_name></trait>
                   <trait><trait_name>Hereditary cancer-predisposing syndrome</trait_name></trait>
                 </trait_set>
               </DocumentSummary>"#,
        );
        let map = parse_summaries(&xml).unwrap();
        let s = map.get("111").unwrap();
        assert_eq!(s.clinical_significance.as_deref(), Some("Pathogenic, risk factor"));
        assert_eq!(
            s.conditions.as_deref(),
            Some(&[
                "Breast-ovarian cancer, familial 1".to_string(),
                "Hereditary cancer-predisposing syndrome".to_string()
            ][..])
        );
    }

    #[test]
    fn test_parse_summaries_germline_classification_layout() {
        let xml = summary_xml(
            r#"<DocumentSummary uid="9">
                 <germline_classification>
                   <description>Likely benign</description>
                   <trait_set><trait><trait_name>not provided</trait_name></trait></trait_set>
                 </germline_classification>
               </DocumentSummary>"#,
        );
        let map = parse_summaries(&xml).unwrap();
        let s = map.get("9").unwrap();
        assert_eq!(s.clinical_significance.as_deref(), Some("Likely benign"));
        assert_eq!(s.conditions, Some(vec!["not provided".to_string()]));
    }

    #[test]
    fn test_missing_fields_are_none_not_fatal() {
        let xml = summary_xml(
            r#"<DocumentSummary uid="1"><obj_type>x</obj_type></DocumentSummary>
               <DocumentSummary uid="2">
                 <clinical_significance><last_evaluated/></clinical_significance>
                 <trait_set><trait><trait_xrefs/></trait></trait_set>
               </DocumentSummary>
               <DocumentSummary uid="3"><clinical_significance><description/></clinical_significance>
                 <trait_set/></DocumentSummary>"#,
        );
        let map = parse_summaries(&xml).unwrap();
        assert_eq!(map.len(), 3);
        assert_eq!(map.get("1").unwrap(), &RecordSummary::default());
        assert_eq!(map.get("2").unwrap(), &RecordSummary::default());
        let three = map.get("3").unwrap();
        assert_eq!(three.clinical_significance, None);
        assert_eq!(three.conditions, Some(vec![]));
    }

    #[test]
    fn test_summaries_keep_response_order() {
        let xml = summary_xml(
            r#"<DocumentSummary uid="222"><clinical_significance><description>Benign</description></clinical_significance></DocumentSummary>
               <DocumentSummary uid="111"><clinical_significance><description>Pathogenic</description></clinical_significance></DocumentSummary>"#,
        );
        let map = parse_summaries(&xml).unwrap();
        let ids: Vec<&str> = map.iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec!["222", "111"]);
    }

    #[test]
    fn test_per_record_error_element_is_benign() {
        let xml = summary_xml(
            r#"<DocumentSummary uid="42"><error>cannot get document summary</error></DocumentSummary>"#,
        );
        let map = parse_summaries(&xml).unwrap();
        assert_eq!(map.get("42").unwrap(), &RecordSummary::default());
    }

    #[test]
    fn test_missing_uid_is_fatal() {
        let xml = summary_xml("<DocumentSummary><obj_type>x</obj_type></DocumentSummary>");
        assert!(matches!(parse_summaries(&xml), Err(AggregateError::Fatal(_))));
    }

    #[test]
    fn test_service_error_is_fatal() {
        let xml = "<eSummaryResult><ERROR>Invalid uid 0 at position=0</ERROR></eSummaryResult>";
        match parse_summaries(xml) {
            Err(AggregateError::Fatal(msg)) => assert!(msg.contains("Invalid uid")),
            other => panic!("expected fatal, got {other:?}"),
        }
    }

    #[test]
    fn test_structural_anomalies_are_fatal() {
        // no summary set
        assert!(matches!(
            parse_summaries("<eSummaryResult></eSummaryResult>"),
            Err(AggregateError::Fatal(_))
        ));
        // truncated
        let truncated = r#"<eSummaryResult><DocumentSummarySet><DocumentSummary uid="1"><clinical_significance>"#;
        assert!(matches!(parse_summaries(truncated), Err(AggregateError::Fatal(_))));
        // nested summaries
        let nested = summary_xml(
            r#"<DocumentSummary uid="1"><DocumentSummary uid="2"></DocumentSummary></DocumentSummary>"#,
        );
        assert!(matches!(parse_summaries(&nested), Err(AggregateError::Fatal(_))));
        // mismatched tags
        let broken = summary_xml(r#"<DocumentSummary uid="1"></trait_set>"#);
        assert!(matches!(parse_summaries(&broken), Err(AggregateError::Fatal(_))));
    }

    #[test]
    fn test_escaped_text_is_unescaped() {
        let xml = summary_xml(
            r#"<DocumentSummary uid="5"><clinical_significance><description>Conflicting interpretations of pathogenicity</description></clinical_significance>
               <trait_set><trait><trait_name>Li-Fraumeni &amp; related</trait_name></trait></trait_set></DocumentSummary>"#,
        );
        let map = parse_summaries(&xml).unwrap();
        assert_eq!(
            map.get("5").unwrap().conditions,
            Some(vec!["Li-Fraumeni & related".to_string()])
        );
    }
}
