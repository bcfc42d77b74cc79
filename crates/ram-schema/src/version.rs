use sea_orm::sea_query::{
    ColumnDef, Expr, InsertStatement, Query, SelectStatement, Table, TableCreateStatement,
};
use sea_orm::{DbErr, DeriveIden, FromQueryResult, QueryResult};

/// Name of the singleton table holding the protocol version.
pub const TABLE_NAME: &str = "ram_version";

#[derive(DeriveIden)]
pub enum RamVersion {
    Table,
    Version,
    CreatedAt,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VersionRow {
    pub version: String,
}

impl FromQueryResult for VersionRow {
    fn from_query_result(res: &QueryResult, pre: &str) -> Result<Self, DbErr> {
        Ok(Self {
            version: res.try_get(pre, "version")?,
        })
    }
}

pub fn create_table() -> TableCreateStatement {
    Table::create()
        .table(RamVersion::Table)
        .if_not_exists()
        .col(
            ColumnDef::new(RamVersion::Version)
                .string_len(255)
                .not_null(),
        )
        .col(
            ColumnDef::new(RamVersion::CreatedAt)
                .timestamp()
                .not_null()
                .default(Expr::current_timestamp()),
        )
        .to_owned()
}

pub fn select_all() -> SelectStatement {
    Query::select()
        .column(RamVersion::Version)
        .from(RamVersion::Table)
        .to_owned()
}

pub fn insert(version: &str) -> Result<InsertStatement, sea_orm::sea_query::error::Error> {
    let mut insert = Query::insert();
    insert
        .into_table(RamVersion::Table)
        .columns([RamVersion::Version])
        .values([version.into()])?;
    Ok(insert)
}
