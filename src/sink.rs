// ABOUTME: Downstream record consumer - schema, record and state messages
// ABOUTME: MessageWriter emits one JSON message per line and flushes each one

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use serde_json::{Map, Value};
use std::io::Write;

use crate::schema::StreamSchema;
use crate::state::ReplicationState;
use crate::sync::window::format_datetime;

/// A flat field-name to value record.
pub type Record = Map<String, Value>;

/// Consumer of replicated streams.
///
/// A stream's schema is always emitted before any of its records.
pub trait RecordSink {
    fn emit_schema(
        &mut self,
        stream: &str,
        schema: &StreamSchema,
        key_properties: &[String],
        bookmark_properties: &[String],
    ) -> Result<()>;

    fn emit_records(&mut self, stream: &str, records: &[Record]) -> Result<()>;
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
enum Message<'a> {
    Schema {
        stream: &'a str,
        schema: &'a StreamSchema,
        key_properties: &'a [String],
        bookmark_properties: &'a [String],
    },
    Record {
        stream: &'a str,
        record: &'a Record,
        time_extracted: String,
    },
    State {
        value: &'a ReplicationState,
    },
}

/// Line-delimited JSON message writer.
pub struct MessageWriter<W: Write> {
    output: W,
}

impl<W: Write> MessageWriter<W> {
    pub fn new(output: W) -> Self {
        Self { output }
    }

    pub fn into_inner(self) -> W {
        self.output
    }

    fn write_message(&mut self, message: &Message<'_>) -> Result<()> {
        serde_json::to_writer(&mut self.output, message).context("Failed to serialize message")?;
        self.output
            .write_all(b"\n")
            .context("Failed to write message")?;
        self.output.flush().context("Failed to flush message")?;
        Ok(())
    }

    pub fn write_state(&mut self, state: &ReplicationState) -> Result<()> {
        self.write_message(&Message::State { value: state })
    }
}

impl MessageWriter<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write> RecordSink for MessageWriter<W> {
    fn emit_schema(
        &mut self,
        stream: &str,
        schema: &StreamSchema,
        key_properties: &[String],
        bookmark_properties: &[String],
    ) -> Result<()> {
        self.write_message(&Message::Schema {
            stream,
            schema,
            key_properties,
            bookmark_properties,
        })
    }

    fn emit_records(&mut self, stream: &str, records: &[Record]) -> Result<()> {
        let time_extracted = format_datetime(&Utc::now());
        for record in records {
            self.write_message(&Message::Record {
                stream,
                record,
                time_extracted: time_extracted.clone(),
            })?;
        }
        Ok(())
    }
}
