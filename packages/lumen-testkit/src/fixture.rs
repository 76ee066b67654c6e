use std::{fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};
use lumen_service::{DocumentMetadata, Passage, Turn};

/// A small corpus plus the questions to ask of it.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Fixture {
	pub documents: Vec<FixtureDocument>,
	#[serde(default)]
	pub queries: Vec<FixtureQuery>,
}
impl Fixture {
	pub fn from_json(raw: &str) -> Result<Self> {
		let fixture: Self = serde_json::from_str(raw)?;

		fixture.validate()?;

		Ok(fixture)
	}

	pub fn passages(&self) -> Vec<Passage> {
		self.documents.iter().flat_map(FixtureDocument::passages).collect()
	}

	fn validate(&self) -> Result<()> {
		for document in &self.documents {
			if document.document_id.trim().is_empty() {
				return Err(Error::Message("Fixture document_id must be non-empty.".to_string()));
			}
			if document.passages.iter().any(|passage| passage.content.trim().is_empty()) {
				return Err(Error::Message(format!(
					"Fixture document {} has an empty passage.",
					document.document_id
				)));
			}
		}

		Ok(())
	}
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FixtureDocument {
	pub document_id: String,
	pub title: String,
	#[serde(default)]
	pub author: Option<String>,
	#[serde(default)]
	pub links: Option<Vec<String>>,
	#[serde(default)]
	pub contact_info: Option<String>,
	pub passages: Vec<FixturePassage>,
}
impl FixtureDocument {
	pub fn metadata(&self) -> DocumentMetadata {
		DocumentMetadata {
			title: self.title.clone(),
			author: self.author.clone(),
			links: self.links.clone(),
			contact_info: self.contact_info.clone(),
		}
	}

	pub fn passages(&self) -> Vec<Passage> {
		self.passages
			.iter()
			.enumerate()
			.map(|(idx, passage)| Passage {
				id: passage.passage_id.clone(),
				document_id: self.document_id.clone(),
				document_title: self.title.clone(),
				document_author: self.author.clone(),
				chunk_index: passage.chunk_index.unwrap_or(idx as i32),
				content: passage.content.clone(),
				token_count: passage
					.token_count
					.unwrap_or_else(|| passage.content.split_whitespace().count() as u32),
			})
			.collect()
	}
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FixturePassage {
	pub passage_id: String,
	#[serde(default)]
	pub chunk_index: Option<i32>,
	pub content: String,
	/// Whitespace word count when omitted.
	#[serde(default)]
	pub token_count: Option<u32>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FixtureQuery {
	pub question: String,
	/// Documents a good retrieval should surface.
	#[serde(default)]
	pub relevant_documents: Vec<String>,
	#[serde(default)]
	pub history: Vec<Turn>,
}

pub fn load_fixture(path: &Path) -> Result<Fixture> {
	let raw = fs::read_to_string(path)?;

	Fixture::from_json(&raw)
}
