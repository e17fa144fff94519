use tantivy::schema::{Field, IndexRecordOption, Schema, TextFieldIndexing, TextOptions, STORED, STRING};
use tantivy::tokenizer::{LowerCaser, RemoveLongFilter, SimpleTokenizer, StopWordFilter, TextAnalyzer};
use tantivy::Index;

use trawl_core::query::{MAX_TOKEN_LEN, STOP_WORDS};

pub const TOKENIZER: &str = "trawl_text";

/// Field handles of a chunk index.
#[derive(Debug, Clone, Copy)]
pub struct Fields {
	pub id: Field,
	pub body: Field,
	pub document_name: Field,
	pub document_id: Field,
	pub metadata: Field,
	pub embedding: Field,
}

impl Fields {
	pub fn resolve(schema: &Schema) -> tantivy::Result<Self> {
		Ok(Self {
			id: schema.get_field("id")?,
			body: schema.get_field("body")?,
			document_name: schema.get_field("document_name")?,
			document_id: schema.get_field("document_id")?,
			metadata: schema.get_field("metadata")?,
			embedding: schema.get_field("embedding")?,
		})
	}
}

pub fn build_schema() -> Schema {
	let mut schema_builder = Schema::builder();
	schema_builder.add_text_field("id", STRING | STORED);
	schema_builder.add_text_field("document_id", STRING | STORED);
	let body_indexing = TextFieldIndexing::default().set_tokenizer(TOKENIZER).set_index_option(IndexRecordOption::WithFreqsAndPositions);
	schema_builder.add_text_field("body", TextOptions::default().set_indexing_options(body_indexing).set_stored());
	let name_indexing = TextFieldIndexing::default().set_tokenizer(TOKENIZER).set_index_option(IndexRecordOption::WithFreqs);
	schema_builder.add_text_field("document_name", TextOptions::default().set_indexing_options(name_indexing));
	// Serialized chunk metadata and little-endian f32 embedding, stored only.
	schema_builder.add_text_field("metadata", STORED);
	schema_builder.add_bytes_field("embedding", STORED);
	schema_builder.build()
}

pub fn register_tokenizer(index: &Index) {
	let tokenizer = TextAnalyzer::builder(SimpleTokenizer::default())
		.filter(RemoveLongFilter::limit(MAX_TOKEN_LEN))
		.filter(LowerCaser)
		.filter(StopWordFilter::remove(STOP_WORDS.iter().map(|s| s.to_string())))
		.build();
	index.tokenizers().register(TOKENIZER, tokenizer);
}

pub fn encode_embedding(embedding: &[f32]) -> Vec<u8> {
	embedding.iter().flat_map(|x| x.to_le_bytes()).collect()
}

pub fn decode_embedding(bytes: &[u8]) -> Vec<f32> {
	bytes.chunks_exact(4).map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]])).collect()
}

#[cfg(test)]
mod tests {
	use super::*;
	use tantivy::tokenizer::TokenStream;

	#[test]
	fn analyzer_lowercases_and_drops_stop_words() {
		let index = Index::create_in_ram(build_schema());
		register_tokenizer(&index);
		let mut analyzer = index.tokenizers().get(TOKENIZER).unwrap();
		let mut stream = analyzer.token_stream("The Borrow Checker and YOU");
		let mut tokens = Vec::new();
		while stream.advance() {
			tokens.push(stream.token().text.clone());
		}
		assert_eq!(tokens, vec!["borrow", "checker", "you"]);
	}

	#[test]
	fn embedding_bytes_round_trip() {
		let v = vec![0.25f32, -1.5, 3.0];
		assert_eq!(decode_embedding(&encode_embedding(&v)), v);
	}
}
