diesel::table! {
    reactions (chat_id, from_user_id, user_id, message_id, reaction) {
        chat_id -> BigInt,
        from_user_id -> BigInt,
        user_id -> BigInt,
        message_id -> BigInt,
        reaction -> Text,
    }
}

diesel::table! {
    ratings (chat_id, user_id) {
        chat_id -> BigInt,
        user_id -> BigInt,
        rating -> BigInt,
    }
}

diesel::table! {
    scoring_attempts (chat_id, from_user_id, message_id) {
        chat_id -> BigInt,
        from_user_id -> BigInt,
        message_id -> BigInt,
    }
}

diesel::table! {
    blacklist (chat_id, user_id) {
        chat_id -> BigInt,
        user_id -> BigInt,
    }
}

diesel::table! {
    usernames (user_id) {
        user_id -> BigInt,
        display_name -> Text,
        updated_at -> Text,
    }
}

diesel::allow_tables_to_appear_in_same_query!(
    reactions,
    ratings,
    scoring_attempts,
    blacklist,
    usernames,
);
