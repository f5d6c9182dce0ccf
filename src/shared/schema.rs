diesel::table! {
    users (id) {
        id -> Uuid,
        name -> Text,
        email -> Text,
        password_hash -> Text,
        role -> Text,
        avatar -> Nullable<Text>,
        company -> Nullable<Text>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    queues (id) {
        id -> Uuid,
        name -> Text,
        description -> Nullable<Text>,
        is_active -> Bool,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    tickets (id) {
        id -> Text,
        title -> Text,
        description -> Text,
        status -> Text,
        priority -> Text,
        category -> Text,
        created_by -> Uuid,
        client_id -> Uuid,
        assigned_to -> Nullable<Uuid>,
        queue_id -> Nullable<Uuid>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    ticket_comments (id) {
        id -> Uuid,
        ticket_id -> Text,
        author_id -> Uuid,
        author_name -> Text,
        content -> Text,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    ticket_files (id) {
        id -> Uuid,
        ticket_id -> Text,
        file_name -> Text,
        content_type -> Text,
        size_bytes -> Int8,
        storage_key -> Text,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    financial_tickets (id) {
        id -> Text,
        title -> Text,
        description -> Nullable<Text>,
        amount -> Numeric,
        due_date -> Date,
        payment_date -> Nullable<Timestamptz>,
        status -> Text,
        client_id -> Uuid,
        created_by -> Uuid,
        erp_id -> Nullable<Text>,
        erp_type -> Nullable<Text>,
        invoice_number -> Nullable<Text>,
        barcode -> Nullable<Text>,
        our_number -> Nullable<Text>,
        payment_method -> Nullable<Text>,
        transaction_id -> Nullable<Text>,
        notes -> Nullable<Text>,
        metadata -> Jsonb,
        invoice_file -> Nullable<Text>,
        receipt_file -> Nullable<Text>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::joinable!(tickets -> queues (queue_id));
diesel::joinable!(ticket_comments -> tickets (ticket_id));
diesel::joinable!(ticket_files -> tickets (ticket_id));

diesel::allow_tables_to_appear_in_same_query!(
    users,
    queues,
    tickets,
    ticket_comments,
    ticket_files,
    financial_tickets,
);
