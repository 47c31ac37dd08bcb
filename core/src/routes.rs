//! URL templates for the DIS v2 REST API.
//!
//! `Routes` holds only the endpoint and project id; every method formats one
//! URL. Path segments and query values are percent-encoded.

use urlencoding::encode;

use crate::types::{CheckpointType, CursorType};

/// Where a cursor starts: a sequence number for `AT_SEQUENCE_NUMBER` and
/// `AFTER_SEQUENCE_NUMBER`, epoch milliseconds for `AT_TIMESTAMP`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorStart<'a> {
    SequenceNumber(&'a str),
    Timestamp(i64),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Routes {
    base: String,
}

impl Routes {
    pub fn new(endpoint: &str, project_id: &str) -> Self {
        Self {
            base: format!("{}/v2/{}", endpoint.trim_end_matches('/'), encode(project_id)),
        }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn records(&self) -> String {
        format!("{}/records", self.base)
    }

    pub fn records_at(&self, partition_cursor: &str) -> String {
        format!("{}/records?partition-cursor={}", self.base, encode(partition_cursor))
    }

    /// Cursor lookup. `start` anchors the sequence-number and timestamp
    /// cursor types; the others ignore it.
    pub fn cursors(
        &self,
        stream_name: &str,
        partition_id: &str,
        cursor_type: CursorType,
        start: Option<CursorStart<'_>>,
    ) -> String {
        let mut url = format!(
            "{}/cursors?stream-name={}&partition-id={}&cursor-type={}",
            self.base,
            encode(stream_name),
            encode(partition_id),
            cursor_type.as_str()
        );
        match start {
            Some(CursorStart::SequenceNumber(seq)) => {
                url.push_str("&starting-sequence-number=");
                url.push_str(&encode(seq));
            }
            Some(CursorStart::Timestamp(ms)) => {
                url.push_str(&format!("&timestamp={ms}"));
            }
            None => {}
        }
        url
    }

    pub fn checkpoints(&self) -> String {
        format!("{}/checkpoints", self.base)
    }

    pub fn checkpoint(
        &self,
        app_name: &str,
        stream_name: &str,
        partition_id: &str,
        checkpoint_type: CheckpointType,
    ) -> String {
        format!(
            "{}/checkpoints?app_name={}&stream_name={}&partition_id={}&checkpoint_type={}",
            self.base,
            encode(app_name),
            encode(stream_name),
            encode(partition_id),
            checkpoint_type.as_str()
        )
    }

    pub fn streams(&self) -> String {
        format!("{}/streams", self.base)
    }

    /// Paged stream listing.
    pub fn streams_page(&self, limit: u32, start_stream_name: Option<&str>) -> String {
        let mut url = format!("{}/streams?limit={limit}", self.base);
        if let Some(start) = start_stream_name {
            url.push_str("&start_stream_name=");
            url.push_str(&encode(start));
        }
        url
    }

    pub fn stream(&self, stream_name: &str) -> String {
        format!("{}/streams/{}", self.base, encode(stream_name))
    }

    pub fn file_upload(&self, stream_name: &str, file_name: &str) -> String {
        format!(
            "{}/streams/{}/files/{}",
            self.base,
            encode(stream_name),
            encode(file_name)
        )
    }

    pub fn apps(&self) -> String {
        format!("{}/apps", self.base)
    }

    pub fn app(&self, app_name: &str) -> String {
        format!("{}/apps/{}", self.base, encode(app_name))
    }
}
