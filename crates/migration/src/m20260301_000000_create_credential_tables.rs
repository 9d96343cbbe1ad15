//! Creates the credential tables of the authorization server.
//!
//! - oauth2_client: registered client applications
//! - oauth2_user: resource owners
//! - oauth2_authorization_code: single-use codes (short-lived)
//! - oauth2_access_token: bearer access tokens
//! - oauth2_refresh_token: multi-use refresh tokens

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(OAuth2Client::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(OAuth2Client::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(OAuth2Client::Name)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(OAuth2Client::Secret).string().not_null())
                    .col(
                        ColumnDef::new(OAuth2Client::Trusted)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(OAuth2Client::RedirectUri).string().null())
                    .col(
                        ColumnDef::new(OAuth2Client::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(OAuth2User::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(OAuth2User::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(OAuth2User::Username)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(OAuth2User::Password).string().not_null())
                    .col(
                        ColumnDef::new(OAuth2User::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(OAuth2AuthorizationCode::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(OAuth2AuthorizationCode::Code)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(OAuth2AuthorizationCode::ClientId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(OAuth2AuthorizationCode::RedirectUri)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(OAuth2AuthorizationCode::UserId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(OAuth2AuthorizationCode::Scope)
                            .text()
                            .not_null()
                            .default(""),
                    )
                    .col(
                        ColumnDef::new(OAuth2AuthorizationCode::ExpiresAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(OAuth2AuthorizationCode::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(OAuth2AccessToken::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(OAuth2AccessToken::Token)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    // NULL for client_credentials tokens
                    .col(ColumnDef::new(OAuth2AccessToken::UserId).string().null())
                    .col(
                        ColumnDef::new(OAuth2AccessToken::ClientId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(OAuth2AccessToken::ExpirationDate)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(OAuth2AccessToken::Scope)
                            .text()
                            .not_null()
                            .default(""),
                    )
                    .col(
                        ColumnDef::new(OAuth2AccessToken::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(OAuth2RefreshToken::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(OAuth2RefreshToken::RefreshToken)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(OAuth2RefreshToken::UserId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(OAuth2RefreshToken::ClientId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(OAuth2RefreshToken::Scope)
                            .text()
                            .not_null()
                            .default(""),
                    )
                    .col(
                        ColumnDef::new(OAuth2RefreshToken::ExpiresAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(OAuth2RefreshToken::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        // Expiry sweep lookups
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_oauth2_authorization_code_expires_at")
                    .table(OAuth2AuthorizationCode::Table)
                    .col(OAuth2AuthorizationCode::ExpiresAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_oauth2_access_token_expiration_date")
                    .table(OAuth2AccessToken::Table)
                    .col(OAuth2AccessToken::ExpirationDate)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_oauth2_refresh_token_expires_at")
                    .table(OAuth2RefreshToken::Table)
                    .col(OAuth2RefreshToken::ExpiresAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_oauth2_access_token_client_id")
                    .table(OAuth2AccessToken::Table)
                    .col(OAuth2AccessToken::ClientId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_oauth2_access_token_client_id")
                    .to_owned(),
            )
            .await?;
        manager
            .drop_index(
                Index::drop()
                    .name("idx_oauth2_refresh_token_expires_at")
                    .to_owned(),
            )
            .await?;
        manager
            .drop_index(
                Index::drop()
                    .name("idx_oauth2_access_token_expiration_date")
                    .to_owned(),
            )
            .await?;
        manager
            .drop_index(
                Index::drop()
                    .name("idx_oauth2_authorization_code_expires_at")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(OAuth2RefreshToken::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(OAuth2AccessToken::Table).to_owned())
            .await?;
        manager
            .drop_table(
                Table::drop()
                    .table(OAuth2AuthorizationCode::Table)
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(Table::drop().table(OAuth2User::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(OAuth2Client::Table).to_owned())
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
enum OAuth2Client {
    #[sea_orm(iden = "oauth2_client")]
    Table,
    Id,
    Name,
    Secret,
    Trusted,
    RedirectUri,
    CreatedAt,
}

#[derive(DeriveIden)]
enum OAuth2User {
    #[sea_orm(iden = "oauth2_user")]
    Table,
    Id,
    Username,
    Password,
    CreatedAt,
}

#[derive(DeriveIden)]
enum OAuth2AuthorizationCode {
    #[sea_orm(iden = "oauth2_authorization_code")]
    Table,
    Code,
    ClientId,
    RedirectUri,
    UserId,
    Scope,
    ExpiresAt,
    CreatedAt,
}

#[derive(DeriveIden)]
enum OAuth2AccessToken {
    #[sea_orm(iden = "oauth2_access_token")]
    Table,
    Token,
    UserId,
    ClientId,
    ExpirationDate,
    Scope,
    CreatedAt,
}

#[derive(DeriveIden)]
enum OAuth2RefreshToken {
    #[sea_orm(iden = "oauth2_refresh_token")]
    Table,
    RefreshToken,
    UserId,
    ClientId,
    Scope,
    ExpiresAt,
    CreatedAt,
}
