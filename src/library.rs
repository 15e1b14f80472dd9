//!
//! src/library.rs  Oct 19th, 2026
//!
//! Rebuilds the track list from what the pinning backend holds: list pins,
//! keep the metadata documents, resolve each and map it to a `Track`
//!

use tracing::{debug, info, warn};

use crate::errors::UploaderError;
use crate::pin::PinStore;
use crate::types::Track;

/// Tracks visible to the api key, newest first. With `owner`, only documents
/// whose owner matches (ignoring case) are kept.
pub async fn discover_tracks(store: &dyn PinStore, owner: Option<&str>)
    -> Result<Vec<Track>, UploaderError> {
    let records = store.list_by_owner(owner.unwrap_or_default()).await?;
    let total = records.len();

    let mut tracks = Vec::new();
    for record in records.iter().filter(|r| r.looks_like_metadata()) {
        let Some(cid) = record.content_id() else {
            debug!(name = ?record.name, "library.skip.no_cid");
            continue;
        };

        let doc = match store.resolve(&cid).await {
            Ok(doc) => doc,
            Err(e) => {
                warn!(cid = %cid, error = %e, "library.resolve.failed");
                continue;
            }
        };

        let Some(mut track) = Track::from_document(cid.clone(), &doc) else {
            debug!(cid = %cid, "library.skip.not_track");
            continue;
        };
        // older documents carry no uploadedAt; fall back to the pin date
        if track.uploaded_at.is_none() {
            track.uploaded_at = record.pinned_at();
        }

        if let Some(owner) = owner {
            let matches = track.owner.as_deref()
                .is_some_and(|o| o.eq_ignore_ascii_case(owner));
            if !matches {
                continue;
            }
        }
        tracks.push(track);
    }

    // undated documents sort last
    tracks.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at));
    info!(pins = total, tracks = tracks.len(), "library.discovered");
    Ok(tracks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use async_trait::async_trait;
    use serde_json::{Value, json};

    use crate::types::{Cid, PinRecord};

    const OWNER: &str = "0x5a12C4a5995F4585bDA7BE7ddda1A110e0b526Fc";

    struct MockLibrary {
        records: Vec<PinRecord>,
        docs: HashMap<String, Value>,
    }

    #[async_trait]
    impl PinStore for MockLibrary {
        async fn store(&self, _bytes: Vec<u8>, _content_type: &str, _key: &str)
            -> Result<Cid, UploaderError> {
            Err(UploaderError::Precondition("read only".to_string()))
        }

        async fn list_by_owner(&self, _owner: &str) -> Result<Vec<PinRecord>, UploaderError> {
            Ok(self.records.clone())
        }

        async fn resolve(&self, cid: &Cid) -> Result<Value, UploaderError> {
            self.docs.get(cid.as_str())
                .cloned()
                .ok_or_else(|| UploaderError::NotFound(cid.to_string()))
        }
    }

    fn record(name: &str, cid: &str) -> PinRecord {
        PinRecord {
            name: Some(name.to_string()),
            cid: Some(cid.to_string()),
            ..Default::default()
        }
    }

    fn doc(title: &str, owner: &str, uploaded_at: &str) -> Value {
        json!({
            "title": title,
            "artist": "Synth Master",
            "ticker": "NEON",
            "audioUrl": format!("https://ipfs.io/ipfs/Qm{title}"),
            "owner": owner,
            "uploadedAt": uploaded_at,
        })
    }

    fn library() -> MockLibrary {
        let mut docs = HashMap::new();
        docs.insert("QmOld".to_string(), doc("Old", OWNER, "2024-01-01T00:00:00Z"));
        docs.insert("QmNew".to_string(), doc("New", &OWNER.to_lowercase(), "2025-06-01T00:00:00Z"));
        docs.insert("QmOther".to_string(), doc("Other", "0x00000000000000000000000000000000000000aa", "2025-01-01T00:00:00Z"));
        docs.insert("QmBroken".to_string(), json!({ "title": "", "artist": "x", "audioUrl": "u" }));

        MockLibrary {
            records: vec![
                record("metadata-1.json", "QmOld"),
                record("song.mp3", "QmAudio"),
                record("metadata-2.json", "QmNew"),
                record("metadata-3.json", "QmOther"),
                record("metadata-4.json", "QmBroken"),
                record("metadata-5.json", "QmGone"),
            ],
            docs,
        }
    }

    #[tokio::test]
    async fn lists_every_track_newest_first() {
        let tracks = discover_tracks(&library(), None).await.unwrap();
        let titles: Vec<_> = tracks.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["New", "Other", "Old"]);
    }

    #[tokio::test]
    async fn owner_filter_ignores_case() {
        let shouted = OWNER.to_uppercase().replace("0X", "0x");
        let tracks = discover_tracks(&library(), Some(shouted.as_str())).await.unwrap();
        let titles: Vec<_> = tracks.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["New", "Old"]);
    }

    #[tokio::test]
    async fn undated_document_sorts_by_pin_date() {
        let mut lib = library();
        lib.docs.insert("QmLegacy".to_string(), json!({
            "title": "Legacy",
            "artist": "Synth Master",
            "audioUrl": "https://ipfs.io/ipfs/QmLegacyAudio",
            "owner": OWNER,
        }));
        let mut legacy = record("metadata-6.json", "QmLegacy");
        legacy.created_at = Some("2024-06-01T00:00:00Z".to_string());
        lib.records.push(legacy);

        let tracks = discover_tracks(&lib, Some(OWNER)).await.unwrap();
        let titles: Vec<_> = tracks.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["New", "Legacy", "Old"]);
        assert!(tracks[1].uploaded_at.is_some());
    }

    #[tokio::test]
    async fn empty_backend_yields_no_tracks() {
        let empty = MockLibrary { records: Vec::new(), docs: HashMap::new() };
        assert!(discover_tracks(&empty, Some(OWNER)).await.unwrap().is_empty());
    }
}
