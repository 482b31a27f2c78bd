//! Firestore REST document store (feature-gated).

pub mod value;

use async_trait::async_trait;
use chat_core::{
    ConversationRecord, Message, RemoteStore, StoreConfig, StoreError, StoreRef,
    document::{ConversationDocument, MessageDocument, parse_messages},
    model::{sort_conversations, sort_messages},
};
use reqwest::{Client as HttpClient, RequestBuilder};
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::{Map, Value};

use self::value::{decode_fields, encode_fields};

const PAGE_SIZE: u32 = 300;
const MESSAGES: &str = "messages";

#[derive(Debug, Deserialize)]
struct Document {
    name: String,
    #[serde(default)]
    fields: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListDocumentsResponse {
    #[serde(default)]
    documents: Vec<Document>,
    next_page_token: Option<String>,
}

/// Firestore storage implementation.
///
/// Conversation documents live in a top-level collection; each document's
/// resource name is its [`StoreRef`], and messages live in its `messages`
/// sub-collection.
pub struct FirestoreStore {
    http: HttpClient,
    base_url: String,
    collection_path: String,
    api_key: Option<String>,
}

impl FirestoreStore {
    /// Create a Firestore store from configuration.
    ///
    /// # Errors
    /// Returns error if no project id is configured.
    pub fn new(config: &StoreConfig) -> Result<Self, StoreError> {
        Self::with_client(HttpClient::new(), config)
    }

    /// Create a Firestore store sharing an existing HTTP client.
    ///
    /// # Errors
    /// Returns error if no project id is configured.
    pub fn with_client(http: HttpClient, config: &StoreConfig) -> Result<Self, StoreError> {
        let project = config
            .project_id
            .as_deref()
            .filter(|p| !p.is_empty())
            .ok_or_else(|| StoreError::Other("Firestore project_id is not configured".to_string()))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            collection_path: format!(
                "projects/{project}/databases/{}/documents/{}",
                config.database, config.collection
            ),
            api_key: config.api_key.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn with_key(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => req.query(&[("key", key)]),
            None => req,
        }
    }

    /// Fetch every document of a collection, following page tokens.
    async fn list_documents(&self, collection: &str) -> Result<Vec<Document>, StoreError> {
        let url = self.url(collection);
        let mut documents = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut req = self.http.get(&url).query(&[("pageSize", PAGE_SIZE)]);
            if let Some(token) = &page_token {
                req = req.query(&[("pageToken", token)]);
            }

            let page: ListDocumentsResponse = send_json(self.with_key(req)).await?;
            documents.extend(page.documents);

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        Ok(documents)
    }
}

async fn send(req: RequestBuilder) -> Result<reqwest::Response, StoreError> {
    let resp = req
        .send()
        .await
        .map_err(|e| StoreError::Other(e.to_string()))?;

    let status = resp.status();
    if !status.is_success() {
        return Err(StoreError::Other(format!("HTTP {status}")));
    }

    Ok(resp)
}

async fn send_json<T: DeserializeOwned>(req: RequestBuilder) -> Result<T, StoreError> {
    let body = send(req)
        .await?
        .bytes()
        .await
        .map_err(|e| StoreError::Other(e.to_string()))?;

    if body.is_empty() {
        return Err(StoreError::NoData);
    }

    let value: Value =
        serde_json::from_slice(&body).map_err(|e| StoreError::Other(e.to_string()))?;
    if !value.is_object() {
        return Err(StoreError::NoData);
    }

    serde_json::from_value(value).map_err(|e| StoreError::Other(e.to_string()))
}

#[async_trait]
impl RemoteStore for FirestoreStore {
    async fn list_conversations(&self) -> Result<Vec<ConversationRecord>, StoreError> {
        let documents = self.list_documents(&self.collection_path).await?;

        let mut records: Vec<ConversationRecord> = documents
            .into_iter()
            .filter_map(|document| {
                ConversationDocument::parse(&decode_fields(&document.fields)).map(|doc| {
                    ConversationRecord {
                        id: doc.chat_id,
                        name: doc.name,
                        reference: StoreRef::new(document.name),
                    }
                })
            })
            .collect();

        sort_conversations(&mut records);
        tracing::debug!(count = records.len(), "Listed conversations");

        Ok(records)
    }

    async fn list_messages(&self, conversation: &StoreRef) -> Result<Vec<Message>, StoreError> {
        let path = format!("{}/{MESSAGES}", conversation.as_str());
        let documents = self.list_documents(&path).await?;

        let plain: Vec<Value> = documents
            .iter()
            .map(|document| decode_fields(&document.fields))
            .collect();

        let mut messages = parse_messages(&plain);
        sort_messages(&mut messages);
        tracing::debug!(%conversation, count = messages.len(), "Listed messages");

        Ok(messages)
    }

    async fn append_message(
        &self,
        conversation: &StoreRef,
        message: &Message,
    ) -> Result<(), StoreError> {
        let url = self.url(&format!("{}/{MESSAGES}", conversation.as_str()));

        let fields = match MessageDocument::from(message).to_value() {
            Value::Object(object) => encode_fields(&object),
            _ => return Err(StoreError::Other("Message document is not an object".to_string())),
        };
        let body = serde_json::json!({ "fields": fields });

        send(self.with_key(self.http.post(&url).json(&body))).await?;
        tracing::debug!(%conversation, message_id = message.id, "Appended message");

        Ok(())
    }
}
