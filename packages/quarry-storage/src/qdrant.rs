use std::collections::HashMap;

use qdrant_client::{
	Payload,
	qdrant::{
		Condition, CreateCollectionBuilder, DatetimeRange, Distance, Filter, PointId, PointStruct,
		Query, QueryPointsBuilder, ScrollPointsBuilder, Timestamp, UpsertPointsBuilder, Value,
		Vector, VectorParamsBuilder, VectorsConfigBuilder, point_id::PointIdOptions, value::Kind,
	},
};
use serde_json::{Map, Value as JsonValue};
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use uuid::Uuid;

use crate::{
	BoxFuture, Error, Result, VectorStore,
	models::{ChunkGranularity, ChunkHit, ChunkRecord, SearchFilters, VectorSearch},
};

pub const DENSE_VECTOR_NAME: &str = "dense";

pub struct QdrantStore {
	pub client: qdrant_client::Qdrant,
	pub collection: String,
	pub vector_dim: u32,
}
impl QdrantStore {
	pub fn new(cfg: &quarry_config::Qdrant) -> Result<Self> {
		let client = qdrant_client::Qdrant::from_url(&cfg.url).build()?;

		Ok(Self { client, collection: cfg.collection.clone(), vector_dim: cfg.vector_dim })
	}

	/// Creates the collection with a named cosine dense vector when it does not exist yet.
	pub async fn ensure_collection(&self) -> Result<()> {
		if self.client.collection_exists(self.collection.clone()).await? {
			return Ok(());
		}

		let mut vectors_config = VectorsConfigBuilder::default();

		vectors_config.add_named_vector_params(
			DENSE_VECTOR_NAME,
			VectorParamsBuilder::new(u64::from(self.vector_dim), Distance::Cosine),
		);

		self.client
			.create_collection(
				CreateCollectionBuilder::new(self.collection.clone()).vectors_config(vectors_config),
			)
			.await?;

		tracing::info!(collection = %self.collection, "Created Qdrant collection.");

		Ok(())
	}

	pub async fn upsert_chunks(&self, records: &[ChunkRecord], vectors: &[Vec<f32>]) -> Result<()> {
		if records.len() != vectors.len() {
			return Err(Error::InvalidArgument(format!(
				"Got {} chunks and {} vectors.",
				records.len(),
				vectors.len()
			)));
		}
		if records.is_empty() {
			return Ok(());
		}

		let mut points = Vec::with_capacity(records.len());

		for (record, vector) in records.iter().zip(vectors) {
			if vector.len() != self.vector_dim as usize {
				return Err(Error::InvalidArgument(format!(
					"Vector for chunk {} has dimension {}, expected {}.",
					record.chunk_id,
					vector.len(),
					self.vector_dim
				)));
			}

			let mut vector_map = HashMap::new();

			vector_map.insert(DENSE_VECTOR_NAME.to_string(), Vector::from(vector.clone()));
			points.push(PointStruct::new(
				record.chunk_id.to_string(),
				vector_map,
				Payload::from(chunk_payload(record)?),
			));
		}

		let upsert = UpsertPointsBuilder::new(self.collection.clone(), points).wait(true);

		self.client.upsert_points(upsert).await?;

		Ok(())
	}

	pub async fn search_chunks(&self, request: &VectorSearch) -> Result<Vec<ChunkHit>> {
		if request.vector.len() != self.vector_dim as usize {
			return Err(Error::InvalidArgument(format!(
				"Query vector has dimension {}, expected {}.",
				request.vector.len(),
				self.vector_dim
			)));
		}

		let search = QueryPointsBuilder::new(self.collection.clone())
			.query(Query::new_nearest(request.vector.clone()))
			.using(DENSE_VECTOR_NAME)
			.filter(build_filter(request.granularity, &request.filters))
			.score_threshold(request.score_threshold)
			.limit(u64::from(request.top_k))
			.with_payload(true);
		let response = self.client.query(search).await?;
		let mut hits = Vec::with_capacity(response.result.len());

		for point in response.result {
			if point.score <= request.score_threshold {
				continue;
			}

			match chunk_from_payload(point.id.as_ref(), &point.payload) {
				Some(chunk) => hits.push(ChunkHit { chunk, score: point.score }),
				None => tracing::warn!(
					collection = %self.collection,
					"Skipping Qdrant point with malformed chunk payload."
				),
			}
		}

		Ok(hits)
	}

	pub async fn fetch_chunks(
		&self,
		document_id: &str,
		granularity: ChunkGranularity,
		chunk_indexes: &[i32],
	) -> Result<Vec<ChunkRecord>> {
		if chunk_indexes.is_empty() {
			return Ok(Vec::new());
		}

		let indexes: Vec<i64> = chunk_indexes.iter().map(|index| i64::from(*index)).collect();
		let filter = Filter::must([
			Condition::matches("document_id", document_id.to_string()),
			Condition::matches("granularity", granularity.as_str().to_string()),
			Condition::matches("chunk_index", indexes),
		]);
		let scroll = ScrollPointsBuilder::new(self.collection.clone())
			.filter(filter)
			.limit(chunk_indexes.len() as u32)
			.with_payload(true);
		let response = self.client.scroll(scroll).await?;
		let mut chunks: Vec<ChunkRecord> = response
			.result
			.iter()
			.filter_map(|point| chunk_from_payload(point.id.as_ref(), &point.payload))
			.collect();

		chunks.sort_by_key(|chunk| chunk.chunk_index);

		Ok(chunks)
	}
}
impl VectorStore for QdrantStore {
	fn search<'a>(&'a self, request: &'a VectorSearch) -> BoxFuture<'a, Result<Vec<ChunkHit>>> {
		Box::pin(self.search_chunks(request))
	}

	fn fetch<'a>(
		&'a self,
		document_id: &'a str,
		granularity: ChunkGranularity,
		chunk_indexes: &'a [i32],
	) -> BoxFuture<'a, Result<Vec<ChunkRecord>>> {
		Box::pin(self.fetch_chunks(document_id, granularity, chunk_indexes))
	}
}

pub fn build_filter(granularity: ChunkGranularity, filters: &SearchFilters) -> Filter {
	let mut must = vec![Condition::matches("granularity", granularity.as_str().to_string())];

	if !filters.sources.is_empty() {
		must.push(Condition::matches("source", filters.sources.clone()));
	}
	if !filters.content_types.is_empty() {
		must.push(Condition::matches("content_type", filters.content_types.clone()));
	}
	if !filters.languages.is_empty() {
		must.push(Condition::matches("language", filters.languages.clone()));
	}

	let gt = filters.created_after.map(to_timestamp);
	let lt = filters.created_before.map(to_timestamp);

	if gt.is_some() || lt.is_some() {
		must.push(Condition::datetime_range(
			"created_at",
			DatetimeRange { lt, gt, gte: None, lte: None },
		));
	}

	Filter::must(must)
}

fn to_timestamp(value: OffsetDateTime) -> Timestamp {
	Timestamp { seconds: value.unix_timestamp(), nanos: value.nanosecond() as i32 }
}

fn chunk_payload(record: &ChunkRecord) -> Result<HashMap<String, Value>> {
	let mut payload = HashMap::new();
	let optional = |value: &Option<String>| match value {
		Some(value) => Value::from(value.clone()),
		None => Value::from(JsonValue::Null),
	};

	payload.insert("chunk_id".to_string(), Value::from(record.chunk_id.to_string()));
	payload.insert("document_id".to_string(), Value::from(record.document_id.clone()));
	payload.insert("chunk_index".to_string(), Value::from(i64::from(record.chunk_index)));
	payload.insert("granularity".to_string(), Value::from(record.granularity.as_str().to_string()));
	payload.insert("content".to_string(), Value::from(record.content.clone()));
	payload.insert("title".to_string(), optional(&record.title));
	payload.insert("source".to_string(), optional(&record.source));
	payload.insert("content_type".to_string(), optional(&record.content_type));
	payload.insert("language".to_string(), optional(&record.language));

	let created_at = match record.created_at.as_ref() {
		Some(created_at) => JsonValue::String(
			created_at.format(&Rfc3339).map_err(|err| Error::InvalidArgument(err.to_string()))?,
		),
		None => JsonValue::Null,
	};

	payload.insert("created_at".to_string(), Value::from(created_at));
	payload.insert(
		"metadata".to_string(),
		Value::from(JsonValue::Object(record.metadata.clone())),
	);

	Ok(payload)
}

fn chunk_from_payload(
	point_id: Option<&PointId>,
	payload: &HashMap<String, Value>,
) -> Option<ChunkRecord> {
	let chunk_id = payload_uuid(payload, "chunk_id").or_else(|| point_id.and_then(point_id_to_uuid))?;
	let granularity = payload_string(payload, "granularity")?.parse().ok()?;

	Some(ChunkRecord {
		chunk_id,
		document_id: payload_string(payload, "document_id")?,
		chunk_index: payload_i32(payload, "chunk_index")?,
		granularity,
		content: payload_string(payload, "content")?,
		title: payload_string(payload, "title"),
		source: payload_string(payload, "source"),
		content_type: payload_string(payload, "content_type"),
		language: payload_string(payload, "language"),
		created_at: payload_string(payload, "created_at")
			.and_then(|raw| OffsetDateTime::parse(raw.trim(), &Rfc3339).ok()),
		metadata: payload_object(payload, "metadata"),
	})
}

fn point_id_to_uuid(point_id: &PointId) -> Option<Uuid> {
	match &point_id.point_id_options {
		Some(PointIdOptions::Uuid(id)) => Uuid::parse_str(id).ok(),
		_ => None,
	}
}

fn payload_uuid(payload: &HashMap<String, Value>, key: &str) -> Option<Uuid> {
	payload_string(payload, key).and_then(|text| Uuid::parse_str(&text).ok())
}

fn payload_string(payload: &HashMap<String, Value>, key: &str) -> Option<String> {
	match &payload.get(key)?.kind {
		Some(Kind::StringValue(text)) => Some(text.to_string()),
		_ => None,
	}
}

fn payload_i32(payload: &HashMap<String, Value>, key: &str) -> Option<i32> {
	match &payload.get(key)?.kind {
		Some(Kind::IntegerValue(value)) => i32::try_from(*value).ok(),
		Some(Kind::DoubleValue(value)) =>
			if value.fract() == 0.0 {
				i32::try_from(*value as i64).ok()
			} else {
				None
			},
		_ => None,
	}
}

fn payload_object(payload: &HashMap<String, Value>, key: &str) -> Map<String, JsonValue> {
	let Some(value) = payload.get(key) else { return Map::new() };

	match value.clone().into_json() {
		JsonValue::Object(map) => map,
		_ => Map::new(),
	}
}
