//! Diesel table definitions for the build service.

diesel::table! {
    builds (id) {
        id -> Int8,
        project_name -> Varchar,
        git_url -> Varchar,
        branch -> Varchar,
        status -> Varchar,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}
