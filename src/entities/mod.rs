pub mod cart;
pub mod cart_line_item;
pub mod inventory_record;
pub mod order;
pub mod order_line_item;
pub mod product;
pub mod product_variant;
pub mod voucher;

pub use cart::Entity as Cart;
pub use cart_line_item::Entity as CartLineItem;
pub use inventory_record::Entity as InventoryRecord;
pub use order::Entity as Order;
pub use order_line_item::Entity as OrderLineItem;
pub use product::Entity as Product;
pub use product_variant::Entity as ProductVariant;
pub use voucher::Entity as Voucher;
