//! Postgres-backed registry.
//!
//! Owns the single connection to the main database for the whole run. The
//! connection is released when the `PgRegistry` is dropped or closed, on
//! every exit path.

use std::error::Error;

use async_trait::async_trait;
use bytes::BytesMut;
use futures::StreamExt;
use migration_state::TenantId;
use tokio::task::JoinHandle;
use tokio_postgres::types::{to_sql_checked, FromSql, IsNull, ToSql, Type};
use tokio_postgres::{Client, NoTls, Row};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::config::RegistryConfig;
use crate::error::{RegistryError, RegistryResult};
use crate::registry::{Registry, TenantRow, TenantStream};

/// Binds a [`TenantId`] with the SQL type of the column it is compared to.
#[derive(Debug)]
pub(crate) struct SqlTenantId<'a>(pub &'a TenantId);

impl ToSql for SqlTenantId<'_> {
    fn to_sql(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> Result<IsNull, Box<dyn Error + Sync + Send>> {
        match self.0 {
            TenantId::Int(v) => {
                if *ty == Type::INT2 {
                    i16::try_from(*v)?.to_sql(ty, out)
                } else if *ty == Type::INT4 {
                    i32::try_from(*v)?.to_sql(ty, out)
                } else if *ty == Type::INT8 {
                    v.to_sql(ty, out)
                } else {
                    Err(format!("integer tenant id cannot be bound as {}", ty).into())
                }
            }
            TenantId::Text(v) => {
                if <&str as ToSql>::accepts(ty) {
                    ToSql::to_sql(&v.as_str(), ty, out)
                } else {
                    Err(format!("text tenant id cannot be bound as {}", ty).into())
                }
            }
            TenantId::Uuid(v) => {
                if *ty == Type::UUID {
                    v.to_sql(ty, out)
                } else {
                    Err(format!("uuid tenant id cannot be bound as {}", ty).into())
                }
            }
        }
    }

    fn accepts(ty: &Type) -> bool {
        <i16 as ToSql>::accepts(ty)
            || <i32 as ToSql>::accepts(ty)
            || <i64 as ToSql>::accepts(ty)
            || <&str as ToSql>::accepts(ty)
            || <Uuid as ToSql>::accepts(ty)
    }

    to_sql_checked!();
}

fn get<'a, T: FromSql<'a>>(row: &'a Row, idx: usize) -> RegistryResult<T> {
    row.try_get(idx)
        .map_err(|e| RegistryError::Decode(format!("column {}: {}", idx, e)))
}

/// Decode the id column according to its SQL type.
fn decode_tenant_id(row: &Row) -> RegistryResult<TenantId> {
    let ty = row
        .columns()
        .first()
        .map(|c| c.type_().clone())
        .ok_or_else(|| RegistryError::Decode("row has no id column".to_string()))?;

    if ty == Type::INT2 {
        Ok(TenantId::Int(get::<i16>(row, 0)?.into()))
    } else if ty == Type::INT4 {
        Ok(TenantId::Int(get::<i32>(row, 0)?.into()))
    } else if ty == Type::INT8 {
        Ok(TenantId::Int(get::<i64>(row, 0)?))
    } else if ty == Type::UUID {
        Ok(TenantId::Uuid(get::<Uuid>(row, 0)?))
    } else if <&str as FromSql>::accepts(&ty) {
        Ok(TenantId::Text(get::<String>(row, 0)?))
    } else {
        Err(RegistryError::Decode(format!(
            "unsupported tenant id column type {}",
            ty
        )))
    }
}

/// Connection column value. The column may be a JSON expression such as
/// `data->'url'`; a JSON string yields its contents, any other JSON value
/// its serialized text.
#[derive(Debug, PartialEq)]
struct ConnectionText(String);

impl<'a> FromSql<'a> for ConnectionText {
    fn from_sql(ty: &Type, raw: &'a [u8]) -> Result<Self, Box<dyn Error + Sync + Send>> {
        if *ty == Type::JSON || *ty == Type::JSONB {
            let text = match serde_json::Value::from_sql(ty, raw)? {
                serde_json::Value::String(s) => s,
                serde_json::Value::Null => String::new(),
                other => other.to_string(),
            };
            Ok(ConnectionText(text))
        } else {
            String::from_sql(ty, raw).map(ConnectionText)
        }
    }

    fn accepts(ty: &Type) -> bool {
        <&str as FromSql>::accepts(ty) || *ty == Type::JSON || *ty == Type::JSONB
    }
}

fn decode_row(row: &Row) -> RegistryResult<TenantRow> {
    let id = decode_tenant_id(row)?;
    let branch = get::<Option<String>>(row, 1)?.ok_or_else(|| {
        RegistryError::Decode(format!("tenant {} has no current branch", id))
    })?;
    let connection = get::<Option<ConnectionText>>(row, 2)?
        .map(|c| c.0)
        .unwrap_or_default();
    Ok(TenantRow {
        id,
        branch,
        connection,
    })
}

/// Registry stored in the main Postgres database
pub struct PgRegistry {
    client: Client,
    connection: JoinHandle<()>,
    config: RegistryConfig,
}

impl PgRegistry {
    /// Connect to the main database.
    #[instrument(skip(url, config))]
    pub async fn connect(url: &str, config: RegistryConfig) -> RegistryResult<Self> {
        let (client, connection) = tokio_postgres::connect(url, NoTls)
            .await
            .map_err(|e| RegistryError::Connect(e.to_string()))?;

        let connection = tokio::spawn(async move {
            if let Err(e) = connection.await {
                warn!(error = %e, "main database connection closed with error");
            }
        });

        info!(table = %config.table_name, "connected to main database");
        Ok(PgRegistry {
            client,
            connection,
            config,
        })
    }

    /// Close the connection and wait for it to shut down.
    pub async fn close(self) {
        let PgRegistry {
            client, connection, ..
        } = self;
        drop(client);
        if let Err(e) = connection.await {
            warn!(error = %e, "main database connection task failed");
        }
        debug!("main database connection closed");
    }
}

#[async_trait]
impl Registry for PgRegistry {
    async fn health_check(&self) -> RegistryResult<()> {
        self.client
            .simple_query("SELECT 1")
            .await
            .map(|_| ())
            .map_err(|e| RegistryError::HealthCheck(e.to_string()))
    }

    async fn tenants(&self) -> RegistryResult<TenantStream<'_>> {
        let sql = self.config.select_sql();
        debug!(%sql, "streaming registry rows");

        let rows = self
            .client
            .query_raw(sql.as_str(), std::iter::empty::<i32>())
            .await
            .map_err(|e| RegistryError::Query(e.to_string()))?;

        Ok(rows
            .map(|row| {
                let row = row.map_err(|e| RegistryError::Query(e.to_string()))?;
                decode_row(&row)
            })
            .boxed())
    }

    async fn restore_tenant(
        &self,
        id: &TenantId,
        connection_url: &str,
    ) -> RegistryResult<Option<String>> {
        let sql = self.config.restore_sql();
        let sentinel: Option<&str> = None;
        let tenant = SqlTenantId(id);

        let row = self
            .client
            .query_opt(sql.as_str(), &[&sentinel, &connection_url, &tenant])
            .await
            .map_err(|e| RegistryError::Query(e.to_string()))?
            .ok_or_else(|| RegistryError::TenantNotFound(id.to_string()))?;

        get::<Option<String>>(&row, 0)
    }
}
