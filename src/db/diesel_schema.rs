// Diesel table definitions, kept in sync with the DDL in schema.rs.

diesel::table! {
    users (id) {
        id -> Text,
        username -> Text,
        email -> Text,
        first_name -> Text,
        last_name -> Text,
        created_at -> Text,
    }
}

diesel::table! {
    boards (id) {
        id -> Text,
        title -> Text,
        description -> Nullable<Text>,
        owner_id -> Text,
        status -> Text,
        budget -> Text,
        currency -> Text,
        start_date -> Nullable<Text>,
        end_date -> Nullable<Text>,
        is_favorite -> Integer,
        tags_json -> Text,
        cover_image -> Nullable<Text>,
        created_at -> Text,
        updated_at -> Text,
    }
}

diesel::table! {
    board_members (board_id, user_id) {
        board_id -> Text,
        user_id -> Text,
        added_at -> Text,
    }
}

diesel::table! {
    lists (id) {
        id -> Text,
        board_id -> Text,
        title -> Text,
        color -> Text,
        position -> Integer,
        created_at -> Text,
        updated_at -> Text,
    }
}

diesel::table! {
    cards (id) {
        id -> Text,
        list_id -> Text,
        title -> Text,
        description -> Nullable<Text>,
        budget -> Text,
        people_number -> Integer,
        tags_json -> Text,
        due_date -> Nullable<Text>,
        subtasks_json -> Text,
        attachments_json -> Text,
        location_json -> Nullable<Text>,
        position -> Integer,
        created_at -> Text,
        updated_at -> Text,
    }
}

diesel::table! {
    card_assignees (card_id, user_id) {
        card_id -> Text,
        user_id -> Text,
    }
}

diesel::table! {
    map_locations (id) {
        id -> Text,
        card_id -> Text,
        name -> Text,
        description -> Nullable<Text>,
        latitude -> Text,
        longitude -> Text,
        address -> Nullable<Text>,
        created_at -> Text,
        updated_at -> Text,
    }
}

diesel::table! {
    budget_categories (id) {
        id -> Text,
        name -> Text,
        description -> Nullable<Text>,
        owner_id -> Text,
        created_at -> Text,
        updated_at -> Text,
    }
}

diesel::table! {
    budgets (id) {
        id -> Text,
        title -> Text,
        description -> Nullable<Text>,
        board_id -> Text,
        total_allocated -> Text,
        created_at -> Text,
        updated_at -> Text,
    }
}

diesel::table! {
    budget_items (id) {
        id -> Text,
        budget_id -> Text,
        category_id -> Nullable<Text>,
        description -> Text,
        allocated_amount -> Text,
        spent_amount -> Text,
        currency -> Text,
        created_at -> Text,
        updated_at -> Text,
    }
}

diesel::table! {
    expenses (id) {
        id -> Text,
        board_id -> Text,
        title -> Text,
        amount -> Text,
        category -> Text,
        date -> Nullable<Text>,
        notes -> Nullable<Text>,
        currency -> Text,
        created_by -> Text,
        created_at -> Text,
        updated_at -> Text,
    }
}

diesel::joinable!(boards -> users (owner_id));
diesel::joinable!(board_members -> boards (board_id));
diesel::joinable!(lists -> boards (board_id));
diesel::joinable!(cards -> lists (list_id));
diesel::joinable!(card_assignees -> cards (card_id));
diesel::joinable!(map_locations -> cards (card_id));
diesel::joinable!(budgets -> boards (board_id));
diesel::joinable!(budget_items -> budgets (budget_id));
diesel::joinable!(expenses -> boards (board_id));

diesel::allow_tables_to_appear_in_same_query!(
    users,
    boards,
    board_members,
    lists,
    cards,
    card_assignees,
    map_locations,
    budget_categories,
    budgets,
    budget_items,
    expenses,
);
