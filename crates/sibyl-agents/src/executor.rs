//! Postgres executor for validated SQL.
//!
//! Statements are prepared first so column names and types are known even
//! for empty result sets, then run over the text protocol; each cell is
//! decoded from its text form using the prepared column type. NUMERIC
//! columns are coerced to floats here — the one JSON-unsafe type the
//! pipeline meets in practice.

use async_trait::async_trait;
use tokio_postgres::types::Type;
use tokio_postgres::{Client, NoTls, SimpleQueryMessage};

use sibyl_core::agents::{AgentError, SqlExecutor};
use sibyl_core::response::{ExecutionResult, Scalar};
use sibyl_core::validate::SafeSql;

pub struct PgExecutor {
    client: Client,
}

impl PgExecutor {
    /// Connect and spawn the connection driver task.
    pub async fn connect(database_url: &str) -> Result<Self, AgentError> {
        let (client, connection) = tokio_postgres::connect(database_url, NoTls)
            .await
            .map_err(|err| AgentError::Database(err.to_string()))?;
        tokio::spawn(async move {
            if let Err(err) = connection.await {
                tracing::error!(error = %err, "postgres connection terminated");
            }
        });
        Ok(Self { client })
    }
}

#[async_trait]
impl SqlExecutor for PgExecutor {
    async fn execute(&self, sql: &SafeSql) -> Result<ExecutionResult, AgentError> {
        let statement = self
            .client
            .prepare(sql.as_str())
            .await
            .map_err(|err| AgentError::Database(err.to_string()))?;
        let columns: Vec<String> = statement
            .columns()
            .iter()
            .map(|column| column.name().to_string())
            .collect();
        let types: Vec<Type> = statement
            .columns()
            .iter()
            .map(|column| column.type_().clone())
            .collect();

        let messages = self
            .client
            .simple_query(sql.as_str())
            .await
            .map_err(|err| AgentError::Database(err.to_string()))?;

        let mut rows = Vec::new();
        for message in messages {
            if let SimpleQueryMessage::Row(row) = message {
                let mut values = Vec::with_capacity(types.len());
                for (index, ty) in types.iter().enumerate() {
                    values.push(decode_cell(row.get(index), ty));
                }
                rows.push(values);
            }
        }

        Ok(ExecutionResult::new(columns, rows))
    }
}

/// Decode one text-protocol cell using its declared type.
fn decode_cell(value: Option<&str>, ty: &Type) -> Scalar {
    let Some(text) = value else {
        return Scalar::Null;
    };
    match ty {
        ty if *ty == Type::BOOL => Scalar::Bool(text == "t"),
        ty if *ty == Type::INT2 || *ty == Type::INT4 || *ty == Type::INT8 => text
            .parse::<i64>()
            .map(Scalar::Int)
            .unwrap_or_else(|_| Scalar::Text(text.to_string())),
        // Decimal-likes become floats before serialization; values that do
        // not parse degrade to their text form rather than failing the turn.
        ty if *ty == Type::FLOAT4 || *ty == Type::FLOAT8 || *ty == Type::NUMERIC => text
            .parse::<f64>()
            .map(Scalar::Float)
            .unwrap_or_else(|_| Scalar::Text(text.to_string())),
        _ => Scalar::Text(text.to_string()),
    }
}
