//! Send emails to user for important updates.
//!
//! Messages are rendered here then handed to a [`JobQueue`] as CloudEvents.
//! Delivery happens out of process.

mod rabbitmq;

pub use rabbitmq::RabbitMqQueue;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use handlebars::Handlebars;
use rand::distributions::{Alphanumeric, DistString};
use rand::rngs::OsRng;
use serde::Serialize;
use serde_json::json;
use tokio::task::JoinHandle;

use crate::error::{Result, ServerError};
use crate::user::User;

const CLOUDEVENT_VERSION: &str = "1.0";
const DATA_CONTENT_TYPE: &str = "application/json";
const EVENT_TYPE: &str = "com.activo.email";
const EVENT_SOURCE: &str = "com.activo.accounts";
const ID_LENGTH: usize = 12;

const WELCOME_SUBJECT: &str = "Welcome to {{name}}";
const WELCOME_BODY: &str = "Hello {{#if first_name}}{{first_name}}{{else}}{{email}}{{/if}},

An account was created for you on {{name}}.

Email: {{email}}
{{#if phone_number}}Phone number: {{phone_number}}
{{/if}}{{#if id_number}}ID number: {{id_number}}
{{/if}}Initial password: {{password}}

You will be asked to choose a new password after your first login.
";

/// Templates known by [`MailManager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Template {
    /// Sent with the initial password of a new account.
    Welcome,
}

impl Template {
    fn name(&self) -> &'static str {
        match self {
            Template::Welcome => "welcome",
        }
    }
}

/// Rendered email.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Message {
    pub to: String,
    pub subject: String,
    pub body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    pub template: Template,
}

/// CloudEvents 1.0 envelope.
#[derive(Debug, Serialize)]
pub struct CloudEvent<'a> {
    specversion: &'static str,
    r#type: &'static str,
    source: &'static str,
    id: String,
    time: String,
    datacontenttype: &'static str,
    data: &'a Message,
}

impl<'a> CloudEvent<'a> {
    pub fn new(data: &'a Message) -> Self {
        Self {
            specversion: CLOUDEVENT_VERSION,
            r#type: EVENT_TYPE,
            source: EVENT_SOURCE,
            id: Alphanumeric.sample_string(&mut OsRng, ID_LENGTH),
            time: Utc::now().to_rfc3339(),
            datacontenttype: DATA_CONTENT_TYPE,
            data,
        }
    }
}

/// Port to the external job queue.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Submit a serialized [`CloudEvent`].
    async fn publish(&self, payload: Vec<u8>) -> Result<()>;
}

/// Mail instance manager.
#[derive(Clone)]
pub struct MailManager {
    name: String,
    sender: Option<String>,
    templates: Arc<Handlebars<'static>>,
    queue: Option<Arc<dyn JobQueue>>,
}

impl MailManager {
    /// Create a new [`MailManager`]. Without a queue, messages are dropped.
    pub fn new(
        name: &str,
        sender: Option<String>,
        queue: Option<Arc<dyn JobQueue>>,
    ) -> Result<Self> {
        let mut templates = Handlebars::new();
        templates.register_escape_fn(handlebars::no_escape);

        let welcome = Template::Welcome.name();
        for (suffix, source) in [("subject", WELCOME_SUBJECT), ("body", WELCOME_BODY)] {
            templates
                .register_template_string(&format!("{welcome}_{suffix}"), source)
                .map_err(|err| ServerError::Internal {
                    details: format!("cannot register template {welcome}_{suffix}: {err}"),
                    source: None,
                })?;
        }

        Ok(Self {
            name: name.to_owned(),
            sender,
            templates: Arc::new(templates),
            queue,
        })
    }

    fn render(
        &self,
        template: Template,
        to: &str,
        data: &serde_json::Value,
    ) -> Result<Message> {
        let name = template.name();

        Ok(Message {
            to: to.to_owned(),
            subject: self.templates.render(&format!("{name}_subject"), data)?,
            body: self.templates.render(&format!("{name}_body"), data)?,
            from: self.sender.clone(),
            template,
        })
    }

    /// Render the welcome message holding the initial password.
    pub fn welcome(&self, user: &User, password: &str) -> Result<Message> {
        let data = json!({
            "name": self.name,
            "email": user.email,
            "first_name": user.first_name,
            "last_name": user.last_name,
            "phone_number": user.phone_number,
            "id_number": user.id_number,
            "password": password,
        });

        self.render(Template::Welcome, &user.email, &data)
    }

    /// Submit a message without waiting for the queue.
    ///
    /// Failures are only logged.
    pub fn dispatch(&self, message: Message) -> Option<JoinHandle<()>> {
        let Some(queue) = self.queue.clone() else {
            tracing::debug!(template = ?message.template, "no mail queue configured, message dropped");
            return None;
        };

        Some(tokio::spawn(async move {
            let result = match serde_json::to_vec(&CloudEvent::new(&message)) {
                Ok(payload) => queue.publish(payload).await,
                Err(err) => Err(err.into()),
            };

            match result {
                Ok(()) => tracing::trace!(template = ?message.template, "event sent"),
                Err(err) => {
                    tracing::error!(template = ?message.template, error = %err, "failed to enqueue mail")
                },
            }
        }))
    }
}

/// Queue keeping published payloads.
#[cfg(test)]
#[derive(Default)]
pub(crate) struct RecordingQueue {
    pub payloads: std::sync::Mutex<Vec<serde_json::Value>>,
    pub fail: bool,
}

#[cfg(test)]
#[async_trait]
impl JobQueue for RecordingQueue {
    async fn publish(&self, payload: Vec<u8>) -> Result<()> {
        if self.fail {
            return Err(ServerError::Internal {
                details: "queue unavailable".into(),
                source: None,
            });
        }
        self.payloads
            .lock()
            .unwrap()
            .push(serde_json::from_slice(&payload)?);
        Ok(())
    }
}
